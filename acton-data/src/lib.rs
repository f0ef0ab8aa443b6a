//! # acton-data
//!
//! Generic relational data access over sqlx's `Any` driver.
//! One repository type serves every entity and every supported dialect.
//!
//! ## Features
//!
//! - **CRUD**: create, batch create, upsert, lookups by id, partial and full updates, deletes
//! - **Filtering**: [`Matcher`] and [`KeywordMatcher`] compiled to parameterized predicates
//! - **Dialect-aware matching**: case-insensitive search and JSON tag matching on PostgreSQL, MySQL and SQLite
//! - **Safe sorting**: sort fields validated against an allow-list before they reach SQL
//! - **Pagination**: [`PageRequest`] in, [`PageResult`] out, count and page under one filter
//! - **Fluent queries**: [`PageQuery`] with joins and projection into another row type
//! - **Transactions**: propagated through an explicit [`Context`], nested scopes join the outer one
//! - **Configuration and tracing**: Figment-based config and JSON structured logging
//!
//! ## Example
//!
//! ```rust,ignore
//! use acton_data::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let db = Database::connect(config.database.as_ref().expect("database configured")).await?;
//!     let articles: Repository<Article> = Repository::new(db.clone());
//!     let ctx = Context::new();
//!
//!     let page = articles
//!         .query()
//!         .contains_ignore_case("title", "rust")
//!         .sort_by_desc("publishedAt", ["published_at"])
//!         .page_size(20)
//!         .execute(&ctx)
//!         .await?;
//!
//!     db.transaction(&ctx, |tx| async move {
//!         articles.delete_by_id(&tx, &page.items[0].id).await?;
//!         Ok::<_, Error>(())
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod database;
pub mod dialect;
pub mod entity;
pub mod error;
pub mod naming;
pub mod observability;
pub mod query;
pub mod repository;

#[cfg(test)]
mod testing;

pub use config::{Config, DatabaseConfig, ServiceConfig};
pub use context::{Context, TxHandle};
pub use database::{Conn, Database};
pub use dialect::{CaseFold, Dialect};
pub use entity::Entity;
pub use error::{DatabaseError, DatabaseErrorKind, DatabaseOperation, Error, Result};
pub use query::{
    KeywordMatcher, LockMode, Matcher, MatcherMode, Sort, SortOrder, Value, ValueKind,
};
pub use repository::{PageQuery, PageRequest, PageResult, Repository};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, DatabaseConfig};
    pub use crate::context::Context;
    pub use crate::database::Database;
    pub use crate::dialect::Dialect;
    pub use crate::entity::Entity;
    pub use crate::error::{Error, Result};
    pub use crate::observability::init_tracing;
    pub use crate::query::{KeywordMatcher, Matcher, MatcherMode, Sort, SortOrder, Value};
    pub use crate::repository::{PageRequest, PageResult, Repository};
}
