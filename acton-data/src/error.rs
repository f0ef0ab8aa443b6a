//! Error types for repositories, query building and transactions

use std::fmt;
use thiserror::Error;

/// Statement class a [`DatabaseError`] was raised from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseOperation {
    Connect,
    /// Reads: selects, counts and scalar lookups
    Query,
    Insert,
    Update,
    Delete,
    /// Begin, commit or rollback
    Transaction,
    PoolAcquire,
}

impl fmt::Display for DatabaseOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Query => "query",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Transaction => "transaction",
            Self::PoolAcquire => "pool_acquire",
        };
        f.write_str(name)
    }
}

/// What went wrong, independent of the statement class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseErrorKind {
    ConnectionFailed,
    NotFound,
    /// Unique, foreign key or check constraint
    ConstraintViolation,
    QueryFailed,
    TransactionFailed,
    /// Bind encoding or column decoding
    TypeConversion,
    Configuration,
    PoolExhausted,
    Other,
}

impl fmt::Display for DatabaseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConnectionFailed => "connection_failed",
            Self::NotFound => "not_found",
            Self::ConstraintViolation => "constraint_violation",
            Self::QueryFailed => "query_failed",
            Self::TransactionFailed => "transaction_failed",
            Self::TypeConversion => "type_conversion",
            Self::Configuration => "configuration",
            Self::PoolExhausted => "pool_exhausted",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Driver failure translated into the operation and kind it belongs to
///
/// Nothing here retries; [`DatabaseError::is_retriable`] only classifies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseError {
    pub operation: DatabaseOperation,
    pub kind: DatabaseErrorKind,
    pub message: String,
    /// Sanitized URL, table or statement the failure relates to
    pub context: Option<String>,
}

impl DatabaseError {
    pub fn new(
        operation: DatabaseOperation,
        kind: DatabaseErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            context: None,
        }
    }

    /// Retag a statement failure with the write it came from
    ///
    /// Errors already tagged with a connection, pool or transaction
    /// operation keep their tag.
    pub fn during(mut self, operation: DatabaseOperation) -> Self {
        if self.operation == DatabaseOperation::Query {
            self.operation = operation;
        }
        self
    }

    pub fn not_found(operation: DatabaseOperation, message: impl Into<String>) -> Self {
        Self::new(operation, DatabaseErrorKind::NotFound, message)
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(
            DatabaseOperation::Connect,
            DatabaseErrorKind::ConnectionFailed,
            message,
        )
    }

    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::new(
            DatabaseOperation::Query,
            DatabaseErrorKind::QueryFailed,
            message,
        )
    }

    pub fn pool_exhausted(message: impl Into<String>) -> Self {
        Self::new(
            DatabaseOperation::PoolAcquire,
            DatabaseErrorKind::PoolExhausted,
            message,
        )
    }

    pub fn transaction_failed(message: impl Into<String>) -> Self {
        Self::new(
            DatabaseOperation::Transaction,
            DatabaseErrorKind::TransactionFailed,
            message,
        )
    }

    /// Failure to encode a bound parameter
    pub fn encode_failed(message: impl Into<String>) -> Self {
        Self::new(
            DatabaseOperation::Query,
            DatabaseErrorKind::TypeConversion,
            message,
        )
    }

    /// Transient failures: connection loss and pool exhaustion
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            DatabaseErrorKind::ConnectionFailed | DatabaseErrorKind::PoolExhausted
        )
    }

    pub fn add_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Database {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let Some(ref ctx) = self.context {
            write!(f, " [context: {}]", ctx)?;
        }
        Ok(())
    }
}

impl std::error::Error for DatabaseError {}

/// Sanitize a database URL by removing credentials
pub fn sanitize_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(scheme_end) = url.find("://") {
            let scheme = &url[..scheme_end + 3];
            let after_at = &url[at_pos + 1..];
            return format!("{}<redacted>@{}", scheme, after_at);
        }
    }
    url.to_string()
}

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the data-access layer
///
/// Large error variants are boxed to reduce stack size
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Structured database error with operation context
    #[error("{0}")]
    Database(DatabaseError),

    /// Sort field not present in the caller's allow-list
    #[error("Invalid sort field '{field}' (allowed: [{}])", .allowed.join(", "))]
    InvalidSort {
        /// Requested field, snake-cased
        field: String,
        /// Fields the caller permitted
        allowed: Vec<String>,
    },

    /// Dialect does not support the requested construct
    #[error("Dialect '{dialect}' does not support {operation}")]
    UnsupportedDialect {
        /// Dialect name as configured
        dialect: String,
        /// Construct that was requested
        operation: &'static str,
    },

    /// Text that is not a well-formed SQL identifier
    #[error("Invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    /// Column not declared by the entity
    #[error("Unknown column '{column}' for table '{table}'")]
    UnknownColumn {
        /// Table the column was resolved against
        table: String,
        /// Rejected column name
        column: String,
    },

    /// Entity lookup by identifier found nothing
    #[error("{entity} with id {id} not found")]
    NotFound {
        /// Table name of the entity
        entity: String,
        /// Identifier that was looked up
        id: String,
    },

    /// A transaction handle was used after commit or rollback
    #[error("Transaction already committed or rolled back")]
    TransactionClosed,
}

impl Error {
    /// Whether this error means "no matching row"
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Database(db) => db.kind == DatabaseErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

// Conversion from sqlx::Error to DatabaseError
impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::Error as E;
        match err {
            E::RowNotFound => Self::not_found(DatabaseOperation::Query, "Row not found"),
            E::PoolTimedOut => Self::pool_exhausted("Connection pool timed out"),
            E::PoolClosed => Self::connection_failed("Connection pool is closed"),
            E::Protocol(msg) => Self::query_failed(msg),
            E::Configuration(e) => Self::new(
                DatabaseOperation::Connect,
                DatabaseErrorKind::Configuration,
                e.to_string(),
            ),
            E::Io(e) => Self::connection_failed(e.to_string()),
            E::Tls(e) => Self::connection_failed(format!("TLS error: {}", e)),
            E::TypeNotFound { type_name } => Self::new(
                DatabaseOperation::Query,
                DatabaseErrorKind::TypeConversion,
                format!("Type not found: {}", type_name),
            ),
            E::ColumnNotFound(col) => Self::query_failed(format!("Column not found: {}", col)),
            E::ColumnDecode { index, source } => Self::new(
                DatabaseOperation::Query,
                DatabaseErrorKind::TypeConversion,
                format!("Failed to decode column {}: {}", index, source),
            ),
            E::Decode(e) => Self::new(
                DatabaseOperation::Query,
                DatabaseErrorKind::TypeConversion,
                e.to_string(),
            ),
            E::AnyDriverError(e) => Self::query_failed(e.to_string()),
            E::Database(db_err) => {
                let kind = if db_err.is_unique_violation()
                    || db_err.is_foreign_key_violation()
                    || db_err.is_check_violation()
                {
                    DatabaseErrorKind::ConstraintViolation
                } else {
                    DatabaseErrorKind::QueryFailed
                };
                Self::new(DatabaseOperation::Query, kind, db_err.to_string())
            }
            E::WorkerCrashed => Self::connection_failed("Database worker crashed"),
            _ => Self::new(
                DatabaseOperation::Query,
                DatabaseErrorKind::Other,
                err.to_string(),
            ),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Database(DatabaseError::from(err))
    }
}

impl From<DatabaseError> for Error {
    fn from(err: DatabaseError) -> Self {
        Error::Database(err)
    }
}
