//! Caller-supplied filter descriptors

use serde::{Deserialize, Serialize};
use std::fmt;

use super::value::Value;
use crate::naming::camel_to_snake;

/// Comparison applied by a [`Matcher`]
///
/// Serialized names are the kebab-case wire values (`contains-ignore-case`,
/// `not-in`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatcherMode {
    /// `LIKE %value%`
    Contains,
    /// Case-insensitive `LIKE %value%`, spelled per dialect
    ContainsIgnoreCase,
    /// `=`, or `IS NULL` for a null value
    #[default]
    Equal,
    /// `IN (...)`
    In,
    NotContains,
    NotContainsIgnoreCase,
    NotEqual,
    NotIn,
    /// Comma-separated tags, each required to be present in a JSON array column
    Tags,
    /// The matcher name lists several fields; any of them may contain the value
    Keyword,
}

impl MatcherMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::ContainsIgnoreCase => "contains-ignore-case",
            Self::Equal => "equal",
            Self::In => "in",
            Self::NotContains => "not-contains",
            Self::NotContainsIgnoreCase => "not-contains-ignore-case",
            Self::NotEqual => "not-equal",
            Self::NotIn => "not-in",
            Self::Tags => "tags",
            Self::Keyword => "keyword",
        }
    }
}

impl fmt::Display for MatcherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single filter on one column
///
/// `name` may be camelCase; it is snake-cased before use. When
/// `custom_table` is set the name is used without the repository's table
/// prefix, which is how columns of joined tables are addressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matcher {
    pub name: String,
    pub value: Value,
    #[serde(default)]
    pub mode: MatcherMode,
    #[serde(default)]
    pub custom_table: bool,
}

impl Matcher {
    pub fn new(name: impl Into<String>, value: impl Into<Value>, mode: MatcherMode) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            mode,
            custom_table: false,
        }
    }

    pub fn equal(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(name, value, MatcherMode::Equal)
    }

    pub fn not_equal(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(name, value, MatcherMode::NotEqual)
    }

    pub fn contains(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(name, value, MatcherMode::Contains)
    }

    pub fn not_contains(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(name, value, MatcherMode::NotContains)
    }

    pub fn contains_ignore_case(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(name, value, MatcherMode::ContainsIgnoreCase)
    }

    pub fn not_contains_ignore_case(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(name, value, MatcherMode::NotContainsIgnoreCase)
    }

    pub fn is_in(name: impl Into<String>, values: impl Into<Value>) -> Self {
        Self::new(name, values, MatcherMode::In)
    }

    pub fn not_in(name: impl Into<String>, values: impl Into<Value>) -> Self {
        Self::new(name, values, MatcherMode::NotIn)
    }

    /// `tags` is a comma-separated list, e.g. `"rust,sql"`
    pub fn tags(name: impl Into<String>, tags: impl Into<Value>) -> Self {
        Self::new(name, tags, MatcherMode::Tags)
    }

    /// `names` is a comma-separated list of fields searched with OR
    pub fn keyword(names: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(names, value, MatcherMode::Keyword)
    }

    /// Address a column outside the repository's table
    pub fn with_custom_table(mut self) -> Self {
        self.custom_table = true;
        self
    }

    pub fn snake_name(&self) -> String {
        camel_to_snake(&self.name)
    }
}

/// Case-insensitive substring search over several fields, ORed together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordMatcher {
    pub names: Vec<String>,
    pub value: Value,
    #[serde(default)]
    pub custom_table: bool,
}

impl KeywordMatcher {
    pub fn new<I, S>(names: I, value: impl Into<Value>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            value: value.into(),
            custom_table: false,
        }
    }

    pub fn with_custom_table(mut self) -> Self {
        self.custom_table = true;
        self
    }
}
