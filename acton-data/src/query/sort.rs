//! Sort descriptors and allow-list validation

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ident::Ident;
use crate::error::{Error, Result};
use crate::naming::camel_to_snake;

/// Sort direction
///
/// Parsing is lenient: `asc`, `ascend` and `ascending` (any case) mean
/// ascending, everything else means descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascend" | "ascending" => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    /// SQL keyword for this direction
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for SortOrder {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<&str> for SortOrder {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<SortOrder> for &'static str {
    fn from(order: SortOrder) -> Self {
        order.as_str()
    }
}

/// A requested ordering plus the fields the caller allows sorting on
///
/// The field is snake-cased at construction. A sort is valid when its field
/// is empty (no ordering requested) or matches an allowed field, either as
/// written or after snake-casing the allowed entry. An empty allow-list
/// rejects every non-empty field.
///
/// ```rust
/// use acton_data::{Sort, SortOrder};
///
/// let sort = Sort::new("createdAt", SortOrder::Asc).allow(["created_at", "name"]);
/// assert!(sort.is_valid());
///
/// let sort = Sort::new("password", SortOrder::Desc).allow(["name"]);
/// assert!(sort.validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "SortParams")]
pub struct Sort {
    field: String,
    order: SortOrder,
    allowed_fields: Vec<String>,
}

#[derive(Deserialize)]
struct SortParams {
    #[serde(default)]
    field: String,
    #[serde(default)]
    order: SortOrder,
    #[serde(default)]
    allowed_fields: Vec<String>,
}

impl From<SortParams> for Sort {
    fn from(p: SortParams) -> Self {
        Sort::new(p.field, p.order).allow(p.allowed_fields)
    }
}

impl Sort {
    pub fn new(field: impl AsRef<str>, order: impl Into<SortOrder>) -> Self {
        Self {
            field: camel_to_snake(field.as_ref().trim()),
            order: order.into(),
            allowed_fields: Vec::new(),
        }
    }

    pub fn asc(field: impl AsRef<str>) -> Self {
        Self::new(field, SortOrder::Asc)
    }

    pub fn desc(field: impl AsRef<str>) -> Self {
        Self::new(field, SortOrder::Desc)
    }

    /// Replace the allow-list
    pub fn allow<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    pub fn allowed_fields(&self) -> &[String] {
        &self.allowed_fields
    }

    pub fn is_empty(&self) -> bool {
        self.field.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        if self.field.is_empty() {
            return true;
        }
        self.allowed_fields
            .iter()
            .any(|allowed| *allowed == self.field || camel_to_snake(allowed) == self.field)
    }

    /// Check the field against the allow-list
    ///
    /// Returns `Ok(None)` when no ordering was requested and an [`OrderBy`]
    /// token otherwise. The token is the only way to get an ORDER BY clause
    /// into a statement.
    pub fn validate(&self) -> Result<Option<OrderBy>> {
        if self.field.is_empty() {
            return Ok(None);
        }
        if !self.is_valid() {
            return Err(Error::InvalidSort {
                field: self.field.clone(),
                allowed: self.allowed_fields.clone(),
            });
        }
        Ok(Some(OrderBy {
            column: Ident::parse(&self.field)?,
            order: self.order,
        }))
    }
}

/// A validated ordering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    column: Ident,
    order: SortOrder,
}

impl OrderBy {
    /// Column as validated; may or may not be table-qualified
    pub fn column(&self) -> &Ident {
        &self.column
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    /// Column qualified with `table` unless it already names a table
    pub fn qualified_column(&self, table: &Ident) -> Result<Ident> {
        Ident::qualified(table, self.column.as_str())
    }

    /// Ordering on a primary key, used by single-row lookups
    pub(crate) fn primary_key(column: Ident) -> Self {
        Self {
            column,
            order: SortOrder::Asc,
        }
    }
}
