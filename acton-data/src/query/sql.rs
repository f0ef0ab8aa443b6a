//! Statement rendering
//!
//! SQL text is only ever appended from three sources: `&'static str`
//! keywords, validated [`Ident`]s, and integer literals. Everything else
//! becomes a bound parameter.

use sqlx::any::AnyArguments;
use sqlx::Arguments;

use super::ident::Ident;
use super::predicate::Filter;
use super::sort::OrderBy;
use super::value::Param;
use crate::dialect::Dialect;
use crate::error::{DatabaseError, Result};

/// Incremental SQL builder that numbers placeholders for its dialect
#[derive(Debug)]
pub struct SqlWriter {
    dialect: Dialect,
    sql: String,
    params: Vec<Param>,
}

impl SqlWriter {
    pub fn new(dialect: &Dialect) -> Self {
        Self {
            dialect: dialect.clone(),
            sql: String::with_capacity(128),
            params: Vec::new(),
        }
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn keyword(&mut self, keyword: &'static str) -> &mut Self {
        self.sql.push_str(keyword);
        self
    }

    pub fn ident(&mut self, ident: &Ident) -> &mut Self {
        self.sql.push_str(ident.as_str());
        self
    }

    /// Comma-separated identifiers
    pub fn idents<'i>(&mut self, idents: impl IntoIterator<Item = &'i Ident>) -> &mut Self {
        for (i, ident) in idents.into_iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.sql.push_str(ident.as_str());
        }
        self
    }

    pub fn bind(&mut self, param: Param) -> &mut Self {
        self.params.push(param);
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
        self
    }

    pub fn number(&mut self, n: u64) -> &mut Self {
        self.sql.push_str(&n.to_string());
        self
    }

    pub fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// Rendered SQL plus its parameters, in placeholder order
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<Param>,
}

impl Statement {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub(crate) fn arguments(&self) -> Result<AnyArguments<'_>> {
        let mut args = AnyArguments::default();
        for param in &self.params {
            let added = match param {
                Param::Null => args.add(Option::<String>::None),
                Param::Bool(b) => args.add(*b),
                Param::Int(n) => args.add(*n),
                Param::Float(f) => args.add(*f),
                Param::Text(s) => args.add(s.as_str()),
            };
            added.map_err(|e| DatabaseError::encode_failed(e.to_string()))?;
        }
        Ok(args)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Left,
    Right,
    Inner,
}

impl JoinKind {
    fn keyword(self) -> &'static str {
        match self {
            JoinKind::Left => " LEFT JOIN ",
            JoinKind::Right => " RIGHT JOIN ",
            JoinKind::Inner => " INNER JOIN ",
        }
    }
}

/// `<kind> JOIN table ON left = right`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: Ident,
    pub left: Ident,
    pub right: Ident,
}

/// Row lock taken by a locked lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// `FOR UPDATE`
    Update,
    /// `FOR SHARE`
    Share,
    /// `FOR UPDATE NOWAIT`
    UpdateNowait,
}

impl LockMode {
    /// SQLite serializes writers and has no row locks, so nothing is emitted
    fn clause(self, dialect: &Dialect) -> Result<Option<&'static str>> {
        match dialect {
            Dialect::Sqlite => Ok(None),
            Dialect::Postgres | Dialect::MySql => Ok(Some(match self {
                LockMode::Update => " FOR UPDATE",
                LockMode::Share => " FOR SHARE",
                LockMode::UpdateNowait => " FOR UPDATE NOWAIT",
            })),
            Dialect::Other(_) => Err(dialect.unsupported("row locking")),
        }
    }
}

/// Everything needed to render the count and select statements of a read
///
/// Both statements share one filter, so the total and the page are computed
/// under the same predicate.
#[derive(Debug, Clone)]
pub struct SelectPlan {
    pub table: Ident,
    /// Empty selects `table.*`
    pub projection: Vec<Ident>,
    pub joins: Vec<Join>,
    pub filter: Filter,
    pub order: Option<OrderBy>,
    /// `(limit, offset)`
    pub window: Option<(u64, u64)>,
    pub lock: Option<LockMode>,
}

impl SelectPlan {
    pub fn new(table: Ident) -> Self {
        Self {
            table,
            projection: Vec::new(),
            joins: Vec::new(),
            filter: Filter::new(),
            order: None,
            window: None,
            lock: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn order(mut self, order: Option<OrderBy>) -> Self {
        self.order = order;
        self
    }

    pub fn window(mut self, limit: u64, offset: u64) -> Self {
        self.window = Some((limit, offset));
        self
    }

    pub fn lock(mut self, lock: LockMode) -> Self {
        self.lock = Some(lock);
        self
    }

    /// `SELECT COUNT(*)` under the filter; no ordering or window
    pub fn count_statement(&self, dialect: &Dialect) -> Result<Statement> {
        let mut w = SqlWriter::new(dialect);
        w.keyword("SELECT COUNT(*) FROM ").ident(&self.table);
        self.render_joins(&mut w);
        self.filter.render_where(&mut w)?;
        Ok(w.finish())
    }

    pub fn select_statement(&self, dialect: &Dialect) -> Result<Statement> {
        let lock = match self.lock {
            Some(mode) => mode.clause(dialect)?,
            None => None,
        };

        let mut w = SqlWriter::new(dialect);
        w.keyword("SELECT ");
        if self.projection.is_empty() {
            w.ident(&self.table).keyword(".*");
        } else {
            w.idents(&self.projection);
        }
        w.keyword(" FROM ").ident(&self.table);
        self.render_joins(&mut w);
        self.filter.render_where(&mut w)?;
        if let Some(order) = &self.order {
            let column = order.qualified_column(&self.table)?;
            w.keyword(" ORDER BY ")
                .ident(&column)
                .keyword(" ")
                .keyword(order.order().as_sql());
        }
        if let Some((limit, offset)) = self.window {
            w.keyword(" LIMIT ").number(limit);
            if offset > 0 {
                w.keyword(" OFFSET ").number(offset);
            }
        }
        if let Some(clause) = lock {
            w.keyword(clause);
        }
        Ok(w.finish())
    }

    fn render_joins(&self, w: &mut SqlWriter) {
        for join in &self.joins {
            w.keyword(join.kind.keyword())
                .ident(&join.table)
                .keyword(" ON ")
                .ident(&join.left)
                .keyword(" = ")
                .ident(&join.right);
        }
    }
}
