//! Connection pool, statement execution and transaction propagation

use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{Any, AnyPool, FromRow};
use std::future::Future;
use std::time::Instant;

use crate::config::DatabaseConfig;
use crate::context::{Context, TxHandle};
use crate::dialect::Dialect;
use crate::error::{sanitize_url, DatabaseError, DatabaseOperation, Error, Result};
use crate::query::Statement;

/// A pool plus the dialect its statements are rendered for
///
/// Cloning is cheap; clones share the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: AnyPool,
    dialect: Dialect,
    show_sql: bool,
}

impl Database {
    /// Open a pool as described by `config`
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connection_timeout())
            .connect(&config.url)
            .await
            .map_err(|e| {
                tracing::error!(
                    "Failed to connect to database at '{}': {}",
                    sanitize_url(&config.url),
                    e
                );
                Error::Database(
                    DatabaseError::connection_failed(e.to_string())
                        .add_context(sanitize_url(&config.url)),
                )
            })?;

        let dialect = config.dialect();
        tracing::info!(
            "Database connection pool created: dialect={}, max={}, min={}",
            dialect,
            config.max_connections,
            config.min_connections
        );

        Ok(Self {
            pool,
            dialect,
            show_sql: config.show_sql,
        })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: AnyPool, dialect: Dialect) -> Self {
        Self {
            pool,
            dialect,
            show_sql: false,
        }
    }

    /// Render statements for a different dialect than the one connected to
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_show_sql(mut self, show_sql: bool) -> Self {
        self.show_sql = show_sql;
        self
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// The context's transaction if it carries one, else the pool
    pub fn connection(&self, ctx: &Context) -> Conn<'_> {
        let target = match ctx.transaction() {
            Some(tx) => Target::Transaction(tx.clone()),
            None => Target::Pool(&self.pool),
        };
        Conn {
            target,
            show_sql: self.show_sql,
        }
    }

    /// Run `body` inside a transaction
    ///
    /// If `ctx` already carries a transaction, `body` runs with `ctx`
    /// unchanged and the enclosing scope decides whether to commit. Otherwise
    /// a transaction is started, `body` receives a context bound to it, and the
    /// transaction is committed when `body` returns `Ok` and rolled back when
    /// it returns `Err`. A failed rollback is logged and the body's error is
    /// returned.
    pub async fn transaction<F, Fut, R, E>(
        &self,
        ctx: &Context,
        body: F,
    ) -> std::result::Result<R, E>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = std::result::Result<R, E>>,
        E: From<Error>,
    {
        if ctx.in_transaction() {
            tracing::debug!("Joining ambient transaction");
            return body(ctx.clone()).await;
        }

        let tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::transaction_failed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;
        tracing::debug!("Transaction started");

        let handle = TxHandle::new(tx);
        let outcome = body(ctx.with_transaction(handle.clone())).await;

        let Some(tx) = handle.take().await else {
            return Err(Error::TransactionClosed.into());
        };

        match outcome {
            Ok(value) => {
                tx.commit().await.map_err(|e| {
                    Error::Database(DatabaseError::transaction_failed(format!(
                        "Failed to commit transaction: {}",
                        e
                    )))
                })?;
                tracing::debug!("Transaction committed");
                Ok(value)
            }
            Err(err) => {
                match tx.rollback().await {
                    Ok(()) => tracing::debug!("Transaction rolled back"),
                    Err(e) => tracing::warn!("Transaction rollback failed: {}", e),
                }
                Err(err)
            }
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

enum Target<'a> {
    Pool(&'a AnyPool),
    Transaction(TxHandle),
}

/// Where a statement runs: the pool or the context's transaction
pub struct Conn<'a> {
    target: Target<'a>,
    show_sql: bool,
}

// Runs `$body` with `$exec` bound to the resolved executor. A closed
// transaction handle short-circuits with `TransactionClosed`.
macro_rules! with_executor {
    ($conn:expr, $exec:ident => $body:expr) => {
        match &$conn.target {
            Target::Pool(pool) => {
                let $exec = *pool;
                $body
            }
            Target::Transaction(handle) => {
                let mut guard = handle.lock().await;
                let tx = guard.as_mut().ok_or(Error::TransactionClosed)?;
                let $exec = &mut **tx;
                $body
            }
        }
    };
}

impl Conn<'_> {
    pub fn is_transaction(&self) -> bool {
        matches!(self.target, Target::Transaction(_))
    }

    pub async fn fetch_all<T>(&self, stmt: &Statement) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
    {
        let started = Instant::now();
        let args = stmt.arguments()?;
        let result = with_executor!(self, exec => {
            sqlx::query_as_with::<Any, T, _>(stmt.sql(), args).fetch_all(exec).await
        });
        self.log(stmt, started, result.as_ref().map(|rows| rows.len() as u64));
        Ok(result?)
    }

    pub async fn fetch_optional<T>(&self, stmt: &Statement) -> Result<Option<T>>
    where
        T: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
    {
        let started = Instant::now();
        let args = stmt.arguments()?;
        let result = with_executor!(self, exec => {
            sqlx::query_as_with::<Any, T, _>(stmt.sql(), args).fetch_optional(exec).await
        });
        self.log(stmt, started, result.as_ref().map(|row| u64::from(row.is_some())));
        Ok(result?)
    }

    /// Single `COUNT(*)`-style integer
    pub async fn fetch_count(&self, stmt: &Statement) -> Result<i64> {
        let started = Instant::now();
        let args = stmt.arguments()?;
        let result = with_executor!(self, exec => {
            sqlx::query_scalar_with::<Any, i64, _>(stmt.sql(), args).fetch_one(exec).await
        });
        self.log(stmt, started, result.as_ref().map(|_| 1));
        Ok(result?)
    }

    /// Rows affected; failures are tagged with `operation`
    pub async fn execute(&self, stmt: &Statement, operation: DatabaseOperation) -> Result<u64> {
        self.execute_raw(stmt, operation)
            .await
            .map(|(rows, _)| rows)
    }

    /// Rows affected and the key the driver reports for the last inserted row
    ///
    /// Only MySQL and SQLite report a key this way.
    pub async fn execute_insert(&self, stmt: &Statement) -> Result<(u64, Option<i64>)> {
        self.execute_raw(stmt, DatabaseOperation::Insert).await
    }

    /// Run an `INSERT ... RETURNING` that yields one integer key
    pub async fn fetch_inserted_key(&self, stmt: &Statement) -> Result<i64> {
        let started = Instant::now();
        let args = stmt.arguments()?;
        let result = with_executor!(self, exec => {
            sqlx::query_scalar_with::<Any, i64, _>(stmt.sql(), args).fetch_one(exec).await
        });
        self.log(stmt, started, result.as_ref().map(|_| 1));
        result.map_err(|e| tagged(e, DatabaseOperation::Insert))
    }

    async fn execute_raw(
        &self,
        stmt: &Statement,
        operation: DatabaseOperation,
    ) -> Result<(u64, Option<i64>)> {
        let started = Instant::now();
        let args = stmt.arguments()?;
        let result = with_executor!(self, exec => {
            sqlx::query_with::<Any, _>(stmt.sql(), args).execute(exec).await
        })
        .map(|done| (done.rows_affected(), done.last_insert_id()));
        self.log(stmt, started, result.as_ref().map(|(rows, _)| *rows));
        result.map_err(|e| tagged(e, operation))
    }

    fn log(
        &self,
        stmt: &Statement,
        started: Instant,
        outcome: std::result::Result<u64, &sqlx::Error>,
    ) {
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        match outcome {
            Ok(rows) if self.show_sql => {
                tracing::debug!(
                    sql = %stmt.sql(),
                    rows,
                    elapsed_ms,
                    in_transaction = self.is_transaction(),
                    "Statement executed"
                );
            }
            Ok(_) => {}
            Err(sqlx::Error::RowNotFound) => {
                tracing::debug!(sql = %stmt.sql(), elapsed_ms, "Statement returned no rows");
            }
            Err(e) => {
                tracing::error!(sql = %stmt.sql(), elapsed_ms, error = %e, "Statement failed");
            }
        }
    }
}

fn tagged(err: sqlx::Error, operation: DatabaseOperation) -> Error {
    Error::Database(DatabaseError::from(err).during(operation))
}
