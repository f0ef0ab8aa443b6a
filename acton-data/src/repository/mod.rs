//! Generic repositories over [`Entity`] types
//!
//! A [`Repository`] provides CRUD primitives, matcher-driven reads, pagination
//! and a fluent query builder for one entity type. Every operation takes a
//! [`Context`] and runs on the context's transaction when it carries one.
//!
//! # Example
//!
//! ```rust,ignore
//! use acton_data::{Context, Database, Matcher, PageRequest, Repository, Sort};
//!
//! let users: Repository<User, i64> = Repository::new(db.clone());
//! let ctx = Context::new();
//!
//! users.create(&ctx, &new_user).await?;
//!
//! let page = users
//!     .page(
//!         &ctx,
//!         &PageRequest::new(1, 20)
//!             .sort(Sort::desc("createdAt").allow(["created_at", "name"]))
//!             .matcher(Matcher::contains_ignore_case("name", "ann")),
//!     )
//!     .await?;
//! ```

mod builder;
mod pagination;

pub use builder::PageQuery;
pub use pagination::{PageRequest, PageResult, DEFAULT_PAGE_SIZE};

use once_cell::sync::OnceCell;
use std::collections::BTreeMap;
use std::marker::PhantomData;

use crate::context::Context;
use crate::database::Database;
use crate::dialect::Dialect;
use crate::entity::{resolve_table_name, Entity};
use crate::error::{DatabaseOperation, Error, Result};
use crate::naming::camel_to_snake;
use crate::query::{
    Filter, Ident, LockMode, Matcher, OrderBy, Param, Predicate, PredicateBuilder, SelectPlan,
    SqlWriter, Statement, Value,
};

/// CRUD and query operations for entity `T` keyed by `Id`
pub struct Repository<T, Id = i64> {
    db: Database,
    table: OnceCell<String>,
    _marker: PhantomData<fn() -> (T, Id)>,
}

impl<T, Id> Clone for Repository<T, Id> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            table: self.table.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T, Id> std::fmt::Debug for Repository<T, Id> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("entity", &std::any::type_name::<T>())
            .field("table", &self.table.get())
            .field("dialect", self.db.dialect())
            .finish()
    }
}

impl<T, Id> Repository<T, Id>
where
    T: Entity,
    Id: Clone + Into<Value> + Send + Sync,
{
    pub fn new(db: Database) -> Self {
        Self {
            db,
            table: OnceCell::new(),
            _marker: PhantomData,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn dialect(&self) -> &Dialect {
        self.db.dialect()
    }

    /// Table name, resolved once per repository
    pub fn table_name(&self) -> &str {
        self.table.get_or_init(resolve_table_name::<T>)
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert one row and return its primary key
    ///
    /// A zero key is generated by the store and the generated value is
    /// returned. PostgreSQL and SQLite read it back with `RETURNING`; other
    /// dialects use the driver's last insert id, or `Value::Null` when the
    /// driver reports none.
    pub async fn create(&self, ctx: &Context, entity: &T) -> Result<Value> {
        let key = entity.primary_key();
        let rows = [entity];
        let conn = self.db.connection(ctx);
        if !key.is_zero() {
            let stmt = self.insert_statement(&rows, false)?;
            conn.execute(&stmt, DatabaseOperation::Insert).await?;
            return Ok(key);
        }

        match self.dialect() {
            Dialect::Postgres | Dialect::Sqlite => {
                let mut w = self.insert_writer(&rows, false)?;
                w.keyword(" RETURNING ").ident(&self.pk_column(false)?);
                let id = conn.fetch_inserted_key(&w.finish()).await?;
                Ok(Value::Int(id))
            }
            _ => {
                let stmt = self.insert_statement(&rows, false)?;
                let (_, id) = conn.execute_insert(&stmt).await?;
                Ok(id.map_or(Value::Null, Value::Int))
            }
        }
    }

    /// Insert `entities` in chunks of `batch_size` rows, returning rows inserted
    ///
    /// A batch size of 0 means a single chunk. Within a chunk, rows with a
    /// zero key and rows with an explicit key go into separate statements so
    /// generated keys are never written as literal zeros. Multiple statements
    /// run in one transaction, joining the ambient one if present.
    pub async fn create_in_batches(
        &self,
        ctx: &Context,
        entities: &[T],
        batch_size: usize,
    ) -> Result<u64> {
        if entities.is_empty() {
            return Ok(0);
        }
        let batch_size = if batch_size == 0 {
            entities.len()
        } else {
            batch_size
        };
        let statements = entities
            .chunks(batch_size)
            .flat_map(|chunk| {
                let (generated, explicit): (Vec<&T>, Vec<&T>) =
                    chunk.iter().partition(|row| row.primary_key().is_zero());
                [generated, explicit]
            })
            .filter(|group| !group.is_empty())
            .map(|group| self.insert_statement(&group, false))
            .collect::<Result<Vec<_>>>()?;

        if let [single] = statements.as_slice() {
            return self
                .db
                .connection(ctx)
                .execute(single, DatabaseOperation::Insert)
                .await;
        }

        self.db
            .transaction(ctx, |tx_ctx| async move {
                let conn = self.db.connection(&tx_ctx);
                let mut inserted = 0;
                for stmt in &statements {
                    inserted += conn.execute(stmt, DatabaseOperation::Insert).await?;
                }
                Ok(inserted)
            })
            .await
    }

    /// Insert, or overwrite every column when the primary key already exists
    pub async fn create_or_update(&self, ctx: &Context, entity: &T) -> Result<u64> {
        let stmt = self.insert_statement(&[entity], true)?;
        self.db
            .connection(ctx)
            .execute(&stmt, DatabaseOperation::Insert)
            .await
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch by primary key; a missing row is [`Error::NotFound`]
    pub async fn find_by_id(&self, ctx: &Context, id: &Id) -> Result<T> {
        match self.find_by_id_exists(ctx, id).await? {
            Some(entity) => Ok(entity),
            None => Err(Error::NotFound {
                entity: self.table_name().to_string(),
                id: Into::<Value>::into(id.clone()).to_string(),
            }),
        }
    }

    /// Fetch by primary key; a missing row is `Ok(None)`
    pub async fn find_by_id_exists(&self, ctx: &Context, id: &Id) -> Result<Option<T>> {
        let stmt = self.single_row_plan(id)?.select_statement(self.dialect())?;
        self.db.connection(ctx).fetch_optional(&stmt).await
    }

    /// Fetch by primary key and lock the row for the rest of the transaction
    pub async fn find_by_id_locked(
        &self,
        ctx: &Context,
        id: &Id,
        lock: LockMode,
    ) -> Result<Option<T>> {
        let stmt = self
            .single_row_plan(id)?
            .lock(lock)
            .select_statement(self.dialect())?;
        self.db.connection(ctx).fetch_optional(&stmt).await
    }

    pub async fn find_by_id_in(&self, ctx: &Context, ids: &[Id]) -> Result<Vec<T>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let plan = self.plan()?.filter(Filter::new().and(self.id_in(ids, true)?));
        let stmt = plan.select_statement(self.dialect())?;
        self.db.connection(ctx).fetch_all(&stmt).await
    }

    pub async fn find_all(&self, ctx: &Context) -> Result<Vec<T>> {
        let stmt = self.plan()?.select_statement(self.dialect())?;
        self.db.connection(ctx).fetch_all(&stmt).await
    }

    pub async fn exists_by_id(&self, ctx: &Context, id: &Id) -> Result<bool> {
        let plan = self.plan()?.filter(Filter::new().and(self.id_eq(id, true)?));
        let stmt = plan.count_statement(self.dialect())?;
        Ok(self.db.connection(ctx).fetch_count(&stmt).await? > 0)
    }

    pub async fn count(&self, ctx: &Context) -> Result<u64> {
        let stmt = self.plan()?.count_statement(self.dialect())?;
        let n = self.db.connection(ctx).fetch_count(&stmt).await?;
        Ok(u64::try_from(n).unwrap_or_default())
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Overwrite the non-zero fields of `entity` on the row with `id`
    ///
    /// Zero values (empty strings, 0, false, null) are left untouched; use
    /// [`Repository::save`] or [`Repository::update_columns_by_id`] to write
    /// them.
    pub async fn update_by_id(&self, ctx: &Context, id: &Id, entity: &T) -> Result<u64> {
        let assignments: Vec<(Ident, Value)> = self
            .assignments(entity)?
            .into_iter()
            .filter(|(_, value)| !value.is_zero())
            .collect();
        if assignments.is_empty() {
            return Ok(0);
        }
        let filter = Filter::new().and(self.id_eq(id, false)?);
        let stmt = self.update_statement(&assignments, filter)?;
        self.db
            .connection(ctx)
            .execute(&stmt, DatabaseOperation::Update)
            .await
    }

    /// Write exactly the given columns, zero values included
    ///
    /// Keys may be camelCase and must name declared entity columns.
    pub async fn update_columns_by_id(
        &self,
        ctx: &Context,
        id: &Id,
        columns: &BTreeMap<String, Value>,
    ) -> Result<u64> {
        if columns.is_empty() {
            return Ok(0);
        }
        let mut assignments = Vec::with_capacity(columns.len());
        for (name, value) in columns {
            let column = camel_to_snake(name.trim());
            if !T::columns().contains(&column.as_str()) {
                return Err(Error::UnknownColumn {
                    table: self.table_name().to_string(),
                    column,
                });
            }
            assignments.push((Ident::parse(&column)?, value.clone()));
        }
        let filter = Filter::new().and(self.id_eq(id, false)?);
        let stmt = self.update_statement(&assignments, filter)?;
        self.db
            .connection(ctx)
            .execute(&stmt, DatabaseOperation::Update)
            .await
    }

    /// Write every column of `entity`, zero values included
    ///
    /// An entity with a zero primary key is inserted. When no row with the
    /// key exists the entity is upserted. Returns rows written.
    pub async fn save(&self, ctx: &Context, entity: &T) -> Result<u64> {
        let id = entity.primary_key();
        if id.is_zero() {
            self.create(ctx, entity).await?;
            return Ok(1);
        }
        let assignments = self.assignments(entity)?;
        if !assignments.is_empty() {
            let filter = Filter::new().and(Predicate::Compare {
                column: Ident::parse(T::PRIMARY_KEY)?,
                value: id,
                negated: false,
            });
            let stmt = self.update_statement(&assignments, filter)?;
            let updated = self
                .db
                .connection(ctx)
                .execute(&stmt, DatabaseOperation::Update)
                .await?;
            if updated > 0 {
                return Ok(updated);
            }
        }
        self.create_or_update(ctx, entity).await
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    pub async fn delete_by_id(&self, ctx: &Context, id: &Id) -> Result<u64> {
        let stmt = self.delete_statement(Filter::new().and(self.id_eq(id, false)?))?;
        self.db
            .connection(ctx)
            .execute(&stmt, DatabaseOperation::Delete)
            .await
    }

    pub async fn delete_by_id_in(&self, ctx: &Context, ids: &[Id]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let stmt = self.delete_statement(Filter::new().and(self.id_in(ids, false)?))?;
        self.db
            .connection(ctx)
            .execute(&stmt, DatabaseOperation::Delete)
            .await
    }

    // ------------------------------------------------------------------
    // Statement helpers
    // ------------------------------------------------------------------

    pub(crate) fn table(&self) -> Result<Ident> {
        Ident::parse(self.table_name())
    }

    pub(crate) fn plan(&self) -> Result<SelectPlan> {
        Ok(SelectPlan::new(self.table()?))
    }

    /// Filter built from `matchers`, restricted to the entity's columns
    pub(crate) fn matcher_filter(&self, filter: Filter, matchers: &[Matcher]) -> Result<Filter> {
        let table = self.table()?;
        PredicateBuilder::new(self.dialect(), &table)
            .with_columns(T::columns())
            .apply(filter, matchers)
    }

    /// Deterministic single-row lookup: ordered by primary key, limit 1
    fn single_row_plan(&self, id: &Id) -> Result<SelectPlan> {
        Ok(self
            .plan()?
            .filter(Filter::new().and(self.id_eq(id, true)?))
            .order(Some(self.primary_key_order()?))
            .window(1, 0))
    }

    pub(crate) fn primary_key_order(&self) -> Result<OrderBy> {
        Ok(OrderBy::primary_key(self.pk_column(true)?))
    }

    fn pk_column(&self, qualified: bool) -> Result<Ident> {
        if qualified {
            Ident::qualified(&self.table()?, T::PRIMARY_KEY)
        } else {
            Ident::parse(T::PRIMARY_KEY)
        }
    }

    fn id_eq(&self, id: &Id, qualified: bool) -> Result<Predicate> {
        Ok(Predicate::Compare {
            column: self.pk_column(qualified)?,
            value: id.clone().into(),
            negated: false,
        })
    }

    fn id_in(&self, ids: &[Id], qualified: bool) -> Result<Predicate> {
        Ok(Predicate::InList {
            column: self.pk_column(qualified)?,
            values: ids.iter().cloned().map(Into::into).collect(),
            negated: false,
        })
    }

    /// Non-key columns paired with the entity's values
    fn assignments(&self, entity: &T) -> Result<Vec<(Ident, Value)>> {
        let values = entity.values();
        T::columns()
            .iter()
            .enumerate()
            .filter(|(_, column)| **column != T::PRIMARY_KEY)
            .map(|(i, column)| {
                let value = values.get(i).cloned().unwrap_or(Value::Null);
                Ok((Ident::parse(column)?, value))
            })
            .collect()
    }

    /// `INSERT INTO ... VALUES (...), (...)`, optionally as an upsert
    fn insert_statement(&self, rows: &[&T], upsert: bool) -> Result<Statement> {
        Ok(self.insert_writer(rows, upsert)?.finish())
    }

    /// The key column is left out when every row has a zero key, so the
    /// store can generate it. Callers never mix zero and explicit keys.
    fn insert_writer(&self, rows: &[&T], upsert: bool) -> Result<SqlWriter> {
        let table = self.table()?;
        let include_pk = rows.iter().any(|row| !row.primary_key().is_zero());
        let columns = T::columns()
            .iter()
            .enumerate()
            .filter(|(_, column)| include_pk || **column != T::PRIMARY_KEY)
            .map(|(i, column)| Ok((i, Ident::parse(column)?)))
            .collect::<Result<Vec<_>>>()?;

        let mut w = SqlWriter::new(self.dialect());
        w.keyword("INSERT INTO ")
            .ident(&table)
            .keyword(" (")
            .idents(columns.iter().map(|(_, column)| column))
            .keyword(") VALUES ");
        for (r, row) in rows.iter().enumerate() {
            if r > 0 {
                w.keyword(", ");
            }
            let values = row.values();
            w.keyword("(");
            for (n, (i, _)) in columns.iter().enumerate() {
                if n > 0 {
                    w.keyword(", ");
                }
                w.bind(values.get(*i).map_or(Param::Null, Value::to_param));
            }
            w.keyword(")");
        }
        if upsert {
            self.render_upsert(&mut w, &columns)?;
        }
        Ok(w)
    }

    fn render_upsert(&self, w: &mut SqlWriter, columns: &[(usize, Ident)]) -> Result<()> {
        let pk = Ident::parse(T::PRIMARY_KEY)?;
        let updates: Vec<&Ident> = columns
            .iter()
            .map(|(_, column)| column)
            .filter(|column| **column != pk)
            .collect();

        match self.dialect() {
            Dialect::Postgres | Dialect::Sqlite => {
                w.keyword(" ON CONFLICT (").ident(&pk).keyword(")");
                if updates.is_empty() {
                    w.keyword(" DO NOTHING");
                    return Ok(());
                }
                w.keyword(" DO UPDATE SET ");
                for (i, column) in updates.iter().enumerate() {
                    if i > 0 {
                        w.keyword(", ");
                    }
                    w.ident(column).keyword(" = excluded.").ident(column);
                }
            }
            Dialect::MySql => {
                w.keyword(" ON DUPLICATE KEY UPDATE ");
                let target = updates.first().copied().unwrap_or(&pk);
                if updates.is_empty() {
                    w.ident(target).keyword(" = ").ident(target);
                    return Ok(());
                }
                for (i, column) in updates.iter().enumerate() {
                    if i > 0 {
                        w.keyword(", ");
                    }
                    w.ident(column)
                        .keyword(" = VALUES(")
                        .ident(column)
                        .keyword(")");
                }
            }
            other @ Dialect::Other(_) => return Err(other.unsupported("upsert")),
        }
        Ok(())
    }

    fn update_statement(&self, assignments: &[(Ident, Value)], filter: Filter) -> Result<Statement> {
        let mut w = SqlWriter::new(self.dialect());
        w.keyword("UPDATE ").ident(&self.table()?).keyword(" SET ");
        for (i, (column, value)) in assignments.iter().enumerate() {
            if i > 0 {
                w.keyword(", ");
            }
            w.ident(column).keyword(" = ").bind(value.to_param());
        }
        filter.render_where(&mut w)?;
        Ok(w.finish())
    }

    fn delete_statement(&self, filter: Filter) -> Result<Statement> {
        let mut w = SqlWriter::new(self.dialect());
        w.keyword("DELETE FROM ").ident(&self.table()?);
        filter.render_where(&mut w)?;
        Ok(w.finish())
    }
}
