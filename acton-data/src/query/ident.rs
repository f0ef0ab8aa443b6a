//! Validated SQL identifiers

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use crate::error::{Error, Result};

/// One to three dot-separated segments of `[A-Za-z_][A-Za-z0-9_]*`
static IDENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*){0,2}$")
        .expect("identifier regex is valid")
});

/// A table or column name that is safe to write into SQL text
///
/// The only way to obtain one is [`Ident::parse`], so any SQL fragment built
/// from `Ident`s cannot carry quotes, whitespace, comments or operators that
/// came from a caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(String);

impl Ident {
    /// Validate `name` against the identifier grammar
    pub fn parse(name: impl AsRef<str>) -> Result<Self> {
        let name = name.as_ref();
        if IDENT_REGEX.is_match(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(Error::InvalidIdentifier(name.to_string()))
        }
    }

    /// `table.column`, unless `column` is already qualified
    pub fn qualified(table: &Ident, column: &str) -> Result<Self> {
        if column.contains('.') {
            Self::parse(column)
        } else {
            Self::parse(format!("{}.{}", table.0, column))
        }
    }

    /// Last segment (the bare column or table name)
    pub fn unqualified(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }

    pub fn is_qualified(&self) -> bool {
        self.0.contains('.')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ident {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
