//! Entity metadata: columns, values, primary key and table name

use sqlx::any::AnyRow;
use sqlx::FromRow;

use crate::naming::default_table_name;
use crate::query::Value;

/// A record type stored in one table
///
/// Rows are decoded with [`sqlx::FromRow`] over the `Any` driver, so
/// `#[derive(sqlx::FromRow)]` is usually all that is needed for reads. Writes
/// go through [`Entity::columns`] and [`Entity::values`], which must list the
/// same columns in the same order.
///
/// ```rust,ignore
/// #[derive(Debug, Clone, sqlx::FromRow)]
/// struct Article {
///     id: i64,
///     title: String,
///     views: i64,
/// }
///
/// impl Entity for Article {
///     fn columns() -> &'static [&'static str] {
///         &["id", "title", "views"]
///     }
///
///     fn values(&self) -> Vec<Value> {
///         vec![self.id.into(), self.title.clone().into(), self.views.into()]
///     }
/// }
/// ```
pub trait Entity: for<'r> FromRow<'r, AnyRow> + Send + Sync + Unpin + 'static {
    /// Primary key column
    const PRIMARY_KEY: &'static str = "id";

    /// Every persisted column, in write order
    fn columns() -> &'static [&'static str];

    /// Column values of this record, in the order of [`Entity::columns`]
    fn values(&self) -> Vec<Value>;

    /// Explicit table name; `None` derives it from the type name
    fn table_name() -> Option<&'static str> {
        None
    }

    fn primary_key(&self) -> Value {
        Self::columns()
            .iter()
            .position(|column| *column == Self::PRIMARY_KEY)
            .and_then(|index| self.values().into_iter().nth(index))
            .unwrap_or(Value::Null)
    }
}

/// Table name for `T`: the naming hook, else the pluralized snake_case type name
pub fn resolve_table_name<T: Entity>() -> String {
    T::table_name()
        .map(str::to_string)
        .unwrap_or_else(default_table_name::<T>)
}
