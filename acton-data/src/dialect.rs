//! SQL dialects and the constructs whose syntax differs between them

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// The SQL dialect a [`Database`](crate::Database) speaks
///
/// Unknown names are kept as [`Dialect::Other`]; portable constructs still
/// work against them, dialect-specific ones fail with
/// [`Error::UnsupportedDialect`] before anything is sent to the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Dialect {
    MySql,
    Sqlite,
    Postgres,
    Other(String),
}

/// How a case-insensitive substring match is spelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseFold {
    /// `LOWER(col) LIKE LOWER(?)`
    Lower,
    /// Plain `LIKE`; the store already compares ASCII case-insensitively
    Like,
    /// `col ILIKE ?`
    ILike,
}

impl Dialect {
    /// Parse a dialect name, case-insensitively
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Dialect::MySql,
            "sqlite" | "sqlite3" => Dialect::Sqlite,
            "postgres" | "postgresql" => Dialect::Postgres,
            other => Dialect::Other(other.to_string()),
        }
    }

    /// Infer the dialect from a connection URL scheme
    pub fn from_url(url: &str) -> Self {
        let scheme = url.split("://").next().unwrap_or(url);
        let scheme = scheme.split(':').next().unwrap_or(scheme);
        Self::from_name(scheme)
    }

    pub fn name(&self) -> &str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
            Dialect::Other(name) => name,
        }
    }

    /// Placeholder for the `index`-th (1-based) bound parameter
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            _ => "?".to_string(),
        }
    }

    /// Case-insensitive substring matching for this dialect
    pub fn case_fold(&self) -> Result<CaseFold> {
        match self {
            Dialect::MySql => Ok(CaseFold::Lower),
            Dialect::Sqlite => Ok(CaseFold::Like),
            Dialect::Postgres => Ok(CaseFold::ILike),
            Dialect::Other(_) => Err(self.unsupported("case-insensitive matching")),
        }
    }

    pub(crate) fn unsupported(&self, operation: &'static str) -> Error {
        Error::UnsupportedDialect {
            dialect: self.name().to_string(),
            operation,
        }
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Dialect::Postgres
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

impl From<String> for Dialect {
    fn from(s: String) -> Self {
        Self::from_name(&s)
    }
}

impl From<Dialect> for String {
    fn from(d: Dialect) -> Self {
        d.name().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name() {
        assert_eq!(Dialect::from_name("MySQL"), Dialect::MySql);
        assert_eq!(Dialect::from_name("postgresql"), Dialect::Postgres);
        assert_eq!(Dialect::from_name("postgres"), Dialect::Postgres);
        assert_eq!(Dialect::from_name("sqlite"), Dialect::Sqlite);
        assert_eq!(
            Dialect::from_name("oracle"),
            Dialect::Other("oracle".to_string())
        );
    }

    #[test]
    fn test_from_url() {
        assert_eq!(
            Dialect::from_url("postgres://u:p@localhost/db"),
            Dialect::Postgres
        );
        assert_eq!(Dialect::from_url("sqlite::memory:"), Dialect::Sqlite);
        assert_eq!(Dialect::from_url("sqlite://app.db?mode=rwc"), Dialect::Sqlite);
        assert_eq!(Dialect::from_url("mysql://root@db/app"), Dialect::MySql);
    }

    #[test]
    fn test_placeholder() {
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
        assert_eq!(Dialect::MySql.placeholder(3), "?");
        assert_eq!(Dialect::Sqlite.placeholder(1), "?");
    }

    #[test]
    fn test_case_fold() {
        assert_eq!(Dialect::MySql.case_fold().unwrap(), CaseFold::Lower);
        assert_eq!(Dialect::Sqlite.case_fold().unwrap(), CaseFold::Like);
        assert_eq!(Dialect::Postgres.case_fold().unwrap(), CaseFold::ILike);
        assert!(matches!(
            Dialect::Other("db2".into()).case_fold(),
            Err(Error::UnsupportedDialect { .. })
        ));
    }

    #[test]
    fn test_serde_uses_names() {
        let d: Dialect = serde_json::from_str("\"postgresql\"").unwrap();
        assert_eq!(d, Dialect::Postgres);
        assert_eq!(serde_json::to_string(&Dialect::MySql).unwrap(), "\"mysql\"");
    }
}
