//! Dynamically typed values for matchers, entity columns and bound parameters

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Scalar kind carried by the [`Value::Empty`] sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    #[default]
    Text,
    Int,
    Float,
    Bool,
}

impl ValueKind {
    /// The zero value of this kind
    pub fn zero(self) -> Value {
        match self {
            ValueKind::Text => Value::Text(String::new()),
            ValueKind::Int => Value::Int(0),
            ValueKind::Float => Value::Float(0.0),
            ValueKind::Bool => Value::Bool(false),
        }
    }
}

/// A value compared against, or written into, a column
///
/// `Empty` is the explicit "match the zero value" sentinel. A matcher whose
/// value is blank (`Text("")` or an empty list) is skipped, while one whose
/// value is `Empty(kind)` is kept and compares against the zero value of
/// `kind`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Empty(ValueKind),
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
}

/// A single bound statement parameter
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Empty-string sentinel, the common case for text columns
    pub fn empty() -> Self {
        Value::Empty(ValueKind::Text)
    }

    /// Replace `Empty` sentinels with the zero value of their kind
    pub fn normalize(self) -> Self {
        match self {
            Value::Empty(kind) => kind.zero(),
            Value::List(items) => Value::List(items.into_iter().map(Value::normalize).collect()),
            other => other,
        }
    }

    /// Blank values cause a matcher to be ignored
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Text(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Zero values are skipped by partial updates
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Empty(_) | Value::Null => true,
            Value::Bool(b) => !b,
            Value::Int(n) => *n == 0,
            Value::Float(f) => *f == 0.0,
            Value::Text(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Items for `IN` lists; scalars become a one-element list
    pub fn into_items(self) -> Vec<Value> {
        match self {
            Value::List(items) => items,
            scalar => vec![scalar],
        }
    }

    /// Bind form of this value; lists are stored as JSON arrays
    pub fn to_param(&self) -> Param {
        match self {
            Value::Empty(kind) => kind.zero().to_param(),
            Value::Null => Param::Null,
            Value::Bool(b) => Param::Bool(*b),
            Value::Int(n) => Param::Int(*n),
            Value::Float(f) => Param::Float(*f),
            Value::Text(s) => Param::Text(s.clone()),
            Value::List(_) => Param::Text(self.to_json().to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Empty(kind) => kind.zero().to_json(),
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty(kind) => fmt::Display::fmt(&kind.zero(), f),
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => f.write_str(s),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    fmt::Display::fmt(item, f)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Null => f.write_str("NULL"),
            Param::Bool(b) => write!(f, "{}", b),
            Param::Int(n) => write!(f, "{}", n),
            Param::Float(x) => write!(f, "{}", x),
            Param::Text(s) => write!(f, "'{}'", s),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            obj @ serde_json::Value::Object(_) => Value::Text(obj.to_string()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Value::Int(i64::from(n))
            }
        })*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f64::from(f))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Text(s.clone())
    }
}

/// Bound as hyphenated text
///
/// The `Any` driver has no uuid parameter type, so this compares against
/// text and `CHAR(36)` columns. A PostgreSQL `uuid` column needs a text key
/// column or a `::text` cast on the column side.
impl From<uuid::Uuid> for Value {
    fn from(id: uuid::Uuid) -> Self {
        Value::Text(id.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}
