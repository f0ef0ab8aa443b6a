//! Request-scoped context carrying the ambient transaction
//!
//! A [`Context`] is threaded explicitly through every repository call. When
//! it carries a transaction, statements run on that transaction's
//! connection; otherwise they run on the pool. Nothing is stored in globals
//! or task-locals.

use http::Extensions;
use sqlx::{Any, Transaction};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Shared handle to a live transaction
///
/// The transaction is taken out exactly once, on commit or rollback. Any
/// statement issued through a stale handle afterwards fails with
/// [`Error::TransactionClosed`](crate::Error::TransactionClosed).
#[derive(Clone)]
pub struct TxHandle {
    inner: Arc<Mutex<Option<Transaction<'static, Any>>>>,
}

impl TxHandle {
    pub(crate) fn new(tx: Transaction<'static, Any>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(tx))),
        }
    }

    /// Whether both handles refer to the same transaction
    pub fn ptr_eq(&self, other: &TxHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// False once committed or rolled back
    pub async fn is_open(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, Option<Transaction<'static, Any>>> {
        self.inner.lock().await
    }

    pub(crate) async fn take(&self) -> Option<Transaction<'static, Any>> {
        self.inner.lock().await.take()
    }
}

impl fmt::Debug for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxHandle")
            .field("ptr", &Arc::as_ptr(&self.inner))
            .finish()
    }
}

/// Reserved extension key; private, so no caller value can collide with it
#[derive(Clone)]
struct ActiveTransaction(TxHandle);

/// Typed key/value carrier passed to every repository operation
///
/// Callers may stash their own request-scoped values with
/// [`Context::insert`]. The active transaction lives under a private key and
/// is only set by [`Database::transaction`](crate::Database::transaction).
#[derive(Debug, Clone, Default)]
pub struct Context {
    extensions: Extensions,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap extensions taken from an incoming request
    pub fn from_extensions(extensions: Extensions) -> Self {
        Self { extensions }
    }

    pub fn insert<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.extensions.insert(value)
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction().is_some()
    }

    /// Both contexts carry the same transaction
    pub fn shares_transaction_with(&self, other: &Context) -> bool {
        match (self.transaction(), other.transaction()) {
            (Some(a), Some(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub fn transaction(&self) -> Option<&TxHandle> {
        self.extensions
            .get::<ActiveTransaction>()
            .map(|active| &active.0)
    }

    /// Copy of this context bound to `tx`
    pub(crate) fn with_transaction(&self, tx: TxHandle) -> Context {
        let mut derived = self.clone();
        derived.extensions.insert(ActiveTransaction(tx));
        derived
    }
}
