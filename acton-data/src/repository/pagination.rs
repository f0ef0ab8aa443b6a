//! Paged and matcher-driven reads
//!
//! A page read validates the sort, builds one filter from the matchers, and
//! issues a count and a windowed select under that same filter. The two
//! statements are separate round trips; run them inside
//! [`Database::transaction`](crate::Database::transaction) when the total
//! must agree exactly with the page.

use serde::{Deserialize, Serialize};
use sqlx::any::AnyRow;
use sqlx::FromRow;

use super::Repository;
use crate::context::Context;
use crate::entity::Entity;
use crate::error::Result;
use crate::query::{Filter, Matcher, SelectPlan, Sort, Value};

/// Page size used when a request asks for less than one row
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// A 1-based page window plus sort and filters
///
/// Out-of-range windows are normalized rather than rejected: a page index
/// below 1 becomes 1 and a page size below 1 becomes [`DEFAULT_PAGE_SIZE`].
///
/// ```rust
/// use acton_data::PageRequest;
///
/// let request = PageRequest::new(0, 0);
/// assert_eq!(request.page_index(), 1);
/// assert_eq!(request.page_size(), 10);
///
/// let request = PageRequest::new(3, 25);
/// assert_eq!(request.offset(), 50);
/// assert_eq!(request.limit(), 25);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default = "first_page")]
    page_index: i64,
    #[serde(default = "default_page_size")]
    page_size: i64,
    #[serde(default)]
    sort: Sort,
    #[serde(default)]
    matchers: Vec<Matcher>,
}

fn first_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    DEFAULT_PAGE_SIZE
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

impl PageRequest {
    pub fn new(page_index: i64, page_size: i64) -> Self {
        Self {
            page_index,
            page_size,
            sort: Sort::default(),
            matchers: Vec::new(),
        }
        .normalized()
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    pub fn matcher(mut self, matcher: Matcher) -> Self {
        self.matchers.push(matcher);
        self
    }

    pub fn matchers(mut self, matchers: impl IntoIterator<Item = Matcher>) -> Self {
        self.matchers.extend(matchers);
        self
    }

    pub(crate) fn set_page_index(&mut self, page_index: i64) {
        self.page_index = page_index.max(1);
    }

    pub(crate) fn set_page_size(&mut self, page_size: i64) {
        self.page_size = if page_size < 1 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size
        };
    }

    pub(crate) fn set_sort(&mut self, sort: Sort) {
        self.sort = sort;
    }

    pub(crate) fn push_matcher(&mut self, matcher: Matcher) {
        self.matchers.push(matcher);
    }

    /// Clamp the window into range
    pub fn normalized(mut self) -> Self {
        if self.page_index < 1 {
            self.page_index = 1;
        }
        if self.page_size < 1 {
            self.page_size = DEFAULT_PAGE_SIZE;
        }
        self
    }

    // Accessors clamp as well, since deserialized requests skip `new`
    pub fn page_index(&self) -> i64 {
        self.page_index.max(1)
    }

    pub fn page_size(&self) -> i64 {
        if self.page_size < 1 {
            DEFAULT_PAGE_SIZE
        } else {
            self.page_size
        }
    }

    pub fn sort_spec(&self) -> &Sort {
        &self.sort
    }

    pub fn matcher_list(&self) -> &[Matcher] {
        &self.matchers
    }

    /// Rows to skip: `(page_index - 1) * page_size`
    pub fn offset(&self) -> u64 {
        let offset = (self.page_index() - 1).saturating_mul(self.page_size());
        u64::try_from(offset).unwrap_or_default()
    }

    pub fn limit(&self) -> u64 {
        u64::try_from(self.page_size()).unwrap_or_default()
    }
}

/// One page of items and the total number of matching rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> PageResult<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResult<U> {
        PageResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

impl<T, Id> Repository<T, Id>
where
    T: Entity,
    Id: Clone + Into<Value> + Send + Sync,
{
    /// One page of entities matching `request`
    pub async fn page(&self, ctx: &Context, request: &PageRequest) -> Result<PageResult<T>> {
        self.page_with_plan(ctx, self.plan()?, request).await
    }

    /// Every entity matching `matchers`, ordered by `sort`
    pub async fn find(&self, ctx: &Context, matchers: &[Matcher], sort: &Sort) -> Result<Vec<T>> {
        let order = sort.validate()?;
        let plan = self
            .plan()?
            .filter(self.matcher_filter(Filter::new(), matchers)?)
            .order(order);
        let stmt = plan.select_statement(self.dialect())?;
        self.database().connection(ctx).fetch_all(&stmt).await
    }

    /// First entity (by primary key) matching `matchers`, if any
    pub async fn find_one(&self, ctx: &Context, matchers: &[Matcher]) -> Result<Option<T>> {
        let plan = self
            .plan()?
            .filter(self.matcher_filter(Filter::new(), matchers)?)
            .order(Some(self.primary_key_order()?))
            .window(1, 0);
        let stmt = plan.select_statement(self.dialect())?;
        self.database().connection(ctx).fetch_optional(&stmt).await
    }

    pub async fn exists(&self, ctx: &Context, matchers: &[Matcher]) -> Result<bool> {
        Ok(self.count_by_matchers(ctx, matchers).await? > 0)
    }

    pub async fn count_by_matchers(&self, ctx: &Context, matchers: &[Matcher]) -> Result<u64> {
        let plan = self
            .plan()?
            .filter(self.matcher_filter(Filter::new(), matchers)?);
        let stmt = plan.count_statement(self.dialect())?;
        let n = self.database().connection(ctx).fetch_count(&stmt).await?;
        Ok(u64::try_from(n).unwrap_or_default())
    }

    /// Shared page pipeline; `plan` may already carry joins and a projection
    ///
    /// Both statements are rendered before either is sent, so an invalid sort
    /// or an unsupported construct fails without touching the store.
    pub(crate) async fn page_with_plan<R>(
        &self,
        ctx: &Context,
        plan: SelectPlan,
        request: &PageRequest,
    ) -> Result<PageResult<R>>
    where
        R: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
    {
        let order = request.sort_spec().validate()?;
        let filter = self.matcher_filter(plan.filter.clone(), request.matcher_list())?;
        let plan = plan
            .filter(filter)
            .order(order)
            .window(request.limit(), request.offset());

        let count = plan.count_statement(self.dialect())?;
        let select = plan.select_statement(self.dialect())?;

        let conn = self.database().connection(ctx);
        let total = u64::try_from(conn.fetch_count(&count).await?).unwrap_or_default();
        if total == 0 {
            return Ok(PageResult {
                items: Vec::new(),
                total,
            });
        }
        let items = conn.fetch_all(&select).await?;
        Ok(PageResult { items, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::error::Error;
    use crate::query::SortOrder;
    use crate::testing::{seed_users, sqlite_database, UserRepo};

    #[test]
    fn test_page_request_normalization() {
        let req = PageRequest::new(0, 0);
        assert_eq!((req.page_index(), req.page_size()), (1, 10));
        assert_eq!(req.offset(), 0);

        let req = PageRequest::new(-4, -1);
        assert_eq!((req.page_index(), req.page_size()), (1, 10));

        let req = PageRequest::new(2, 5);
        assert_eq!((req.offset(), req.limit()), (5, 5));
    }

    #[test]
    fn test_page_request_from_json() {
        let req: PageRequest = serde_json::from_str(
            r#"{
                "page_index": 0,
                "page_size": 0,
                "sort": {"field": "createdAt", "order": "ascend", "allowed_fields": ["created_at"]},
                "matchers": [{"name": "status", "value": "active", "mode": "equal"}]
            }"#,
        )
        .unwrap();
        assert_eq!(req.page_index(), 1);
        assert_eq!(req.page_size(), 10);
        assert_eq!(req.sort_spec().order(), SortOrder::Asc);
        assert_eq!(req.matcher_list().len(), 1);
    }

    #[test]
    fn test_page_result_serializes_items_and_total() {
        let page = PageResult {
            items: vec![1, 2],
            total: 7,
        };
        assert_eq!(
            serde_json::to_value(&page).unwrap(),
            serde_json::json!({"items": [1, 2], "total": 7})
        );
        assert_eq!(page.map(|n| n * 10).items, vec![10, 20]);
    }

    #[tokio::test]
    async fn test_page_without_matchers_matches_count() {
        let (_dir, db) = sqlite_database().await;
        let repo = UserRepo::new(db);
        let ctx = Context::new();
        seed_users(&repo, &ctx, 12).await;

        let page = repo.page(&ctx, &PageRequest::new(1, 5)).await.unwrap();
        assert_eq!(page.total, repo.count(&ctx).await.unwrap());
        assert_eq!(page.items.len(), 5);
    }

    #[tokio::test]
    async fn test_page_windows_and_sorts() {
        let (_dir, db) = sqlite_database().await;
        let repo = UserRepo::new(db);
        let ctx = Context::new();
        seed_users(&repo, &ctx, 12).await;

        let request = PageRequest::new(3, 5).sort(Sort::asc("age").allow(["age"]));
        let page = repo.page(&ctx, &request).await.unwrap();
        assert_eq!(page.total, 12);
        let ages: Vec<i64> = page.items.iter().map(|u| u.age).collect();
        assert_eq!(ages, vec![11, 12]);
    }

    #[tokio::test]
    async fn test_page_with_matchers() {
        let (_dir, db) = sqlite_database().await;
        let repo = UserRepo::new(db);
        let ctx = Context::new();
        seed_users(&repo, &ctx, 12).await;

        let request = PageRequest::new(1, 100)
            .matcher(Matcher::contains_ignore_case("name", "USER-1"))
            .sort(Sort::desc("age").allow(["age"]));
        let page = repo.page(&ctx, &request).await.unwrap();
        // user-1, user-10, user-11, user-12
        assert_eq!(page.total, 4);
        assert_eq!(page.items[0].age, 12);
    }

    #[tokio::test]
    async fn test_invalid_sort_fails_fast() {
        let (_dir, db) = sqlite_database().await;
        let repo = UserRepo::new(db);
        let request = PageRequest::new(1, 5).sort(Sort::desc("email"));
        let err = repo.page(&Context::new(), &request).await.unwrap_err();
        assert!(matches!(err, Error::InvalidSort { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_dialect_fails_without_querying() {
        // The table does not exist, so any statement that reached the store
        // would fail with a database error instead.
        let (_dir, db) = sqlite_database().await;
        let repo: crate::Repository<crate::testing::Ghost, i64> =
            crate::Repository::new(db.with_dialect(Dialect::Other("oracle".into())));
        let request = PageRequest::new(1, 5).matcher(Matcher::contains_ignore_case("name", "x"));
        let err = repo.page(&Context::new(), &request).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedDialect { .. }));
    }

    #[tokio::test]
    async fn test_keyword_on_unsupported_dialect_fails_without_querying() {
        let (_dir, db) = sqlite_database().await;
        let repo: crate::Repository<crate::testing::Ghost, i64> =
            crate::Repository::new(db.with_dialect(Dialect::Other("oracle".into())));
        let matchers = [Matcher::keyword("name", "x")];
        let err = repo
            .count_by_matchers(&Context::new(), &matchers)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedDialect { ref dialect, .. } if dialect == "oracle"
        ));
    }

    #[tokio::test]
    async fn test_empty_sentinel_matches_zero_value() {
        let (_dir, db) = sqlite_database().await;
        let repo = UserRepo::new(db);
        let ctx = Context::new();
        seed_users(&repo, &ctx, 3).await;

        let matchers = [Matcher::equal("email", Value::empty())];
        assert_eq!(repo.count_by_matchers(&ctx, &matchers).await.unwrap(), 3);

        // A blank value is skipped entirely rather than compared
        let blank = [Matcher::equal("name", "")];
        assert_eq!(repo.count_by_matchers(&ctx, &blank).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_find_find_one_and_exists() {
        let (_dir, db) = sqlite_database().await;
        let repo = UserRepo::new(db);
        let ctx = Context::new();
        seed_users(&repo, &ctx, 6).await;

        let found = repo
            .find(
                &ctx,
                &[Matcher::is_in("age", vec![2, 4, 6])],
                &Sort::desc("age").allow(["age"]),
            )
            .await
            .unwrap();
        let ages: Vec<i64> = found.iter().map(|u| u.age).collect();
        assert_eq!(ages, vec![6, 4, 2]);

        let one = repo
            .find_one(&ctx, &[Matcher::not_equal("age", 1)])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(one.age, 2);

        assert!(repo
            .find_one(&ctx, &[Matcher::equal("name", "nobody")])
            .await
            .unwrap()
            .is_none());
        assert!(repo.exists(&ctx, &[Matcher::equal("name", "user-3")]).await.unwrap());
        assert!(!repo.exists(&ctx, &[Matcher::equal("name", "user-30")]).await.unwrap());
    }

    #[tokio::test]
    async fn test_tags_match_json_array_column() {
        let (_dir, db) = sqlite_database().await;
        let repo = UserRepo::new(db);
        let ctx = Context::new();
        seed_users(&repo, &ctx, 4).await;

        // seed_users tags even ages with "even" and every user with "user"
        let tagged = repo
            .count_by_matchers(&ctx, &[Matcher::tags("tags", "user, even")])
            .await
            .unwrap();
        assert_eq!(tagged, 2);
    }

    #[tokio::test]
    async fn test_null_and_unknown_columns() {
        let (_dir, db) = sqlite_database().await;
        let repo = UserRepo::new(db);
        let ctx = Context::new();
        seed_users(&repo, &ctx, 2).await;

        let nulls = repo
            .count_by_matchers(&ctx, &[Matcher::equal("nickname", Value::Null)])
            .await
            .unwrap();
        assert_eq!(nulls, 2);

        let err = repo
            .count_by_matchers(&ctx, &[Matcher::equal("password", "x")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownColumn { .. }));
    }
}
