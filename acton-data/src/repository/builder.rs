//! Fluent page queries with joins and projection
//!
//! Joined tables and projection columns are collected as plain strings and
//! validated as identifiers when the query runs, so a bad name surfaces as
//! [`Error::InvalidIdentifier`](crate::Error::InvalidIdentifier) from
//! [`PageQuery::execute`] rather than a panic while building.

use sqlx::any::AnyRow;
use sqlx::FromRow;

use super::{PageRequest, PageResult, Repository};
use crate::context::Context;
use crate::entity::Entity;
use crate::error::Result;
use crate::query::{Ident, Join, JoinKind, Matcher, Sort, Value};

/// A page read assembled step by step
///
/// Filters on joined tables take a qualified name and
/// [`Matcher::with_custom_table`], since only the entity's own columns pass
/// the column check otherwise.
///
/// ```rust,ignore
/// let page = users
///     .query()
///     .page_size(20)
///     .contains_ignore_case("name", "ann")
///     .inner_join("orders", "users.id", "orders.user_id")
///     .select(["users.name", "orders.total"])
///     .sort_by_desc("orders.total", ["orders.total"])
///     .execute_as::<UserTotal>(&ctx)
///     .await?;
/// ```
#[derive(Debug)]
pub struct PageQuery<'r, T, Id> {
    repo: &'r Repository<T, Id>,
    request: PageRequest,
    joins: Vec<(JoinKind, String, String, String)>,
    projection: Vec<String>,
}

impl<T, Id> Repository<T, Id>
where
    T: Entity,
    Id: Clone + Into<Value> + Send + Sync,
{
    /// Start a fluent page query: first page, default size, no sort
    pub fn query(&self) -> PageQuery<'_, T, Id> {
        PageQuery {
            repo: self,
            request: PageRequest::default(),
            joins: Vec::new(),
            projection: Vec::new(),
        }
    }
}

impl<'r, T, Id> PageQuery<'r, T, Id>
where
    T: Entity,
    Id: Clone + Into<Value> + Send + Sync,
{
    pub fn page_index(mut self, page_index: i64) -> Self {
        self.request.set_page_index(page_index);
        self
    }

    pub fn page_size(mut self, page_size: i64) -> Self {
        self.request.set_page_size(page_size);
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.request.set_sort(sort);
        self
    }

    /// Ascending sort on `field`, which must appear in `allowed`
    pub fn sort_by<I, S>(self, field: impl AsRef<str>, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sort(Sort::asc(field).allow(allowed))
    }

    pub fn sort_by_desc<I, S>(self, field: impl AsRef<str>, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sort(Sort::desc(field).allow(allowed))
    }

    /// Take window, sort and matchers from an existing request
    ///
    /// Matchers already added to this query are kept.
    pub fn page_request(mut self, request: &PageRequest) -> Self {
        self.request.set_page_index(request.page_index());
        self.request.set_page_size(request.page_size());
        self.request.set_sort(request.sort_spec().clone());
        self.filter(request.matcher_list().iter().cloned())
    }

    pub fn filter(mut self, matchers: impl IntoIterator<Item = Matcher>) -> Self {
        for matcher in matchers {
            self.request.push_matcher(matcher);
        }
        self
    }

    fn matcher(mut self, matcher: Matcher) -> Self {
        self.request.push_matcher(matcher);
        self
    }

    pub fn equal(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.matcher(Matcher::equal(name, value))
    }

    pub fn not_equal(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.matcher(Matcher::not_equal(name, value))
    }

    pub fn contains(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.matcher(Matcher::contains(name, value))
    }

    pub fn not_contains(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.matcher(Matcher::not_contains(name, value))
    }

    pub fn contains_ignore_case(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.matcher(Matcher::contains_ignore_case(name, value))
    }

    pub fn not_contains_ignore_case(
        self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.matcher(Matcher::not_contains_ignore_case(name, value))
    }

    pub fn is_in(self, name: impl Into<String>, values: impl Into<Value>) -> Self {
        self.matcher(Matcher::is_in(name, values))
    }

    pub fn not_in(self, name: impl Into<String>, values: impl Into<Value>) -> Self {
        self.matcher(Matcher::not_in(name, values))
    }

    /// Every comma-separated tag must be present in the JSON array column
    pub fn tags(self, name: impl Into<String>, tags: impl Into<Value>) -> Self {
        self.matcher(Matcher::tags(name, tags))
    }

    /// Case-insensitive search across several columns, any of which may match
    pub fn keyword<I, S>(self, fields: I, value: impl Into<Value>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = fields
            .into_iter()
            .map(|field| field.as_ref().trim().to_string())
            .filter(|field| !field.is_empty())
            .collect::<Vec<_>>()
            .join(",");
        self.matcher(Matcher::keyword(names, value))
    }

    /// Keyword search over columns of a joined `table`
    pub fn keyword_in<I, S>(self, table: &str, fields: I, value: impl Into<Value>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let table = table.trim();
        let names = fields
            .into_iter()
            .map(|field| field.as_ref().trim().to_string())
            .filter(|field| !field.is_empty())
            .map(|field| format!("{table}.{field}"))
            .collect::<Vec<_>>()
            .join(",");
        self.matcher(Matcher::keyword(names, value).with_custom_table())
    }

    pub fn left_join(self, table: &str, left: &str, right: &str) -> Self {
        self.join(JoinKind::Left, table, left, right)
    }

    pub fn right_join(self, table: &str, left: &str, right: &str) -> Self {
        self.join(JoinKind::Right, table, left, right)
    }

    pub fn inner_join(self, table: &str, left: &str, right: &str) -> Self {
        self.join(JoinKind::Inner, table, left, right)
    }

    fn join(mut self, kind: JoinKind, table: &str, left: &str, right: &str) -> Self {
        self.joins
            .push((kind, table.to_string(), left.to_string(), right.to_string()));
        self
    }

    /// Columns to project; replaces any earlier projection
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.projection = fields
            .into_iter()
            .map(|field| field.as_ref().trim().to_string())
            .filter(|field| !field.is_empty())
            .collect();
        self
    }

    /// The request this query has accumulated so far
    pub fn request(&self) -> &PageRequest {
        &self.request
    }

    pub async fn execute(self, ctx: &Context) -> Result<PageResult<T>> {
        self.execute_as::<T>(ctx).await
    }

    /// Run the query and map each row into `R` instead of the entity
    pub async fn execute_as<R>(self, ctx: &Context) -> Result<PageResult<R>>
    where
        R: for<'row> FromRow<'row, AnyRow> + Send + Unpin,
    {
        let mut plan = self.repo.plan()?;
        plan.joins = self
            .joins
            .iter()
            .map(|(kind, table, left, right)| -> Result<Join> {
                Ok(Join {
                    kind: *kind,
                    table: Ident::parse(table)?,
                    left: Ident::parse(left)?,
                    right: Ident::parse(right)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        plan.projection = self
            .projection
            .iter()
            .map(Ident::parse)
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            table = %plan.table,
            joins = plan.joins.len(),
            projected = plan.projection.len(),
            "Executing page query"
        );
        self.repo.page_with_plan(ctx, plan, &self.request).await
    }
}

#[cfg(test)]
mod tests {
    use crate::context::Context;
    use crate::error::Error;
    use crate::testing::{seed_users, sqlite_database, user, Order, User, UserRepo};
    use crate::{Matcher, PageRequest, Repository, Sort};

    #[derive(Debug, sqlx::FromRow)]
    struct UserTotal {
        name: String,
        total: i64,
    }

    #[tokio::test]
    async fn test_query_pages_filtered_rows() {
        let (_dir, db) = sqlite_database().await;
        let repo = UserRepo::new(db);
        let ctx = Context::new();
        seed_users(&repo, &ctx, 14).await;

        let page = repo
            .query()
            .not_in("age", vec![13, 14])
            .page_index(2)
            .page_size(5)
            .sort_by("age", ["age"])
            .execute(&ctx)
            .await
            .unwrap();

        assert_eq!(page.total, 12);
        let ages: Vec<i64> = page.items.iter().map(|u| u.age).collect();
        assert_eq!(ages, vec![6, 7, 8, 9, 10]);
    }

    #[tokio::test]
    async fn test_query_equal_matcher_second_page() {
        let (_dir, db) = sqlite_database().await;
        let repo = UserRepo::new(db);
        let ctx = Context::new();

        let mut rows: Vec<User> = (1..=12).map(|i| user(0, &format!("thirty-{i}"), 30)).collect();
        rows.extend((1..=3).map(|i| user(0, &format!("other-{i}"), 31)));
        repo.create_in_batches(&ctx, &rows, 4).await.unwrap();

        let page = repo
            .query()
            .equal("age", 30)
            .sort_by("age", ["age"])
            .page_index(2)
            .page_size(5)
            .execute(&ctx)
            .await
            .unwrap();

        assert_eq!(page.total, 12);
        assert_eq!(page.items.len(), 5);
        assert!(page.items.iter().all(|u| u.age == 30));
    }

    #[tokio::test]
    async fn test_query_clamps_window() {
        let (_dir, db) = sqlite_database().await;
        let repo = UserRepo::new(db);
        let query = repo.query().page_index(-3).page_size(0);
        assert_eq!(query.request().page_index(), 1);
        assert_eq!(query.request().page_size(), 10);
    }

    #[tokio::test]
    async fn test_query_keyword_and_page_request() {
        let (_dir, db) = sqlite_database().await;
        let repo = UserRepo::new(db);
        let ctx = Context::new();
        seed_users(&repo, &ctx, 12).await;

        let request = PageRequest::new(1, 3)
            .sort(Sort::desc("age").allow(["age"]))
            .matcher(Matcher::not_equal("age", 12));
        let page = repo
            .query()
            .page_request(&request)
            .keyword(["name", "email"], "USER-1")
            .execute(&ctx)
            .await
            .unwrap();

        // user-1, user-10, user-11 once user-12 is excluded
        assert_eq!(page.total, 3);
        let ages: Vec<i64> = page.items.iter().map(|u| u.age).collect();
        assert_eq!(ages, vec![11, 10, 1]);
    }

    #[tokio::test]
    async fn test_query_join_projects_into_other_type() {
        let (_dir, db) = sqlite_database().await;
        let users = UserRepo::new(db.clone());
        let orders: Repository<Order, i64> = Repository::new(db);
        let ctx = Context::new();
        seed_users(&users, &ctx, 3).await;

        for (user_id, total) in [(1, 50), (1, 75), (3, 20)] {
            orders
                .create(
                    &ctx,
                    &Order {
                        id: 0,
                        user_id,
                        total,
                    },
                )
                .await
                .unwrap();
        }

        let page = users
            .query()
            .inner_join("orders", "users.id", "orders.user_id")
            .select(["users.name", "orders.total"])
            .filter([Matcher::not_equal("orders.total", 20).with_custom_table()])
            .sort_by_desc("orders.total", ["orders.total"])
            .execute_as::<UserTotal>(&ctx)
            .await
            .unwrap();

        assert_eq!(page.total, 2);
        let rows: Vec<(&str, i64)> = page
            .items
            .iter()
            .map(|row| (row.name.as_str(), row.total))
            .collect();
        assert_eq!(rows, vec![("user-1", 75), ("user-1", 50)]);
    }

    #[tokio::test]
    async fn test_query_keyword_in_joined_table() {
        let (_dir, db) = sqlite_database().await;
        let users = UserRepo::new(db.clone());
        let orders: Repository<Order, i64> = Repository::new(db);
        let ctx = Context::new();
        seed_users(&users, &ctx, 2).await;
        for (user_id, total) in [(1, 75), (2, 30)] {
            orders
                .create(&ctx, &Order { id: 0, user_id, total })
                .await
                .unwrap();
        }

        let query = users
            .query()
            .inner_join("orders", "users.id", "orders.user_id")
            .select(["users.name", "orders.total"])
            .keyword_in("orders", ["total", " "], "7");
        let matcher = &query.request().matcher_list()[0];
        assert_eq!(matcher.name, "orders.total");
        assert!(matcher.custom_table);

        let page = query.execute_as::<UserTotal>(&ctx).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "user-1");
        assert_eq!(page.items[0].total, 75);
    }

    #[tokio::test]
    async fn test_query_rejects_invalid_identifiers() {
        let (_dir, db) = sqlite_database().await;
        let repo = UserRepo::new(db);
        let ctx = Context::new();

        let err = repo
            .query()
            .left_join("orders; DROP TABLE users", "users.id", "orders.user_id")
            .execute(&ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier(_)));

        let err = repo
            .query()
            .select(["users.name AS n"])
            .execute(&ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier(_)));
    }
}
