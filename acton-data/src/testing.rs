//! Fixtures shared by the unit tests: a temporary SQLite store and entities

use tempfile::TempDir;

use crate::config::DatabaseConfig;
use crate::context::Context;
use crate::database::Database;
use crate::entity::Entity;
use crate::query::Value;
use crate::repository::Repository;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub(crate) struct User {
    pub id: i64,
    pub name: String,
    pub age: i64,
    pub email: String,
    /// JSON array of strings
    pub tags: String,
    pub nickname: Option<String>,
}

impl Entity for User {
    fn columns() -> &'static [&'static str] {
        &["id", "name", "age", "email", "tags", "nickname"]
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.into(),
            self.name.clone().into(),
            self.age.into(),
            self.email.clone().into(),
            self.tags.clone().into(),
            self.nickname.clone().into(),
        ]
    }
}

pub(crate) type UserRepo = Repository<User, i64>;

pub(crate) fn user(id: i64, name: &str, age: i64) -> User {
    User {
        id,
        name: name.to_string(),
        age,
        email: String::new(),
        tags: "[]".to_string(),
        nickname: None,
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub(crate) struct Order {
    pub id: i64,
    pub user_id: i64,
    pub total: i64,
}

impl Entity for Order {
    fn columns() -> &'static [&'static str] {
        &["id", "user_id", "total"]
    }

    fn values(&self) -> Vec<Value> {
        vec![self.id.into(), self.user_id.into(), self.total.into()]
    }
}

/// Entity whose table is never created
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct Ghost {
    pub id: i64,
    pub name: String,
}

impl Entity for Ghost {
    fn columns() -> &'static [&'static str] {
        &["id", "name"]
    }

    fn values(&self) -> Vec<Value> {
        vec![self.id.into(), self.name.clone().into()]
    }
}

const SCHEMA: [&str; 2] = [
    "CREATE TABLE users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL DEFAULT '',
        age INTEGER NOT NULL DEFAULT 0,
        email TEXT NOT NULL DEFAULT '',
        tags TEXT NOT NULL DEFAULT '[]',
        nickname TEXT
    )",
    "CREATE TABLE orders (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        total INTEGER NOT NULL
    )",
];

/// File-backed SQLite database with the `users` and `orders` tables
///
/// The directory guard must outlive the database.
pub(crate) async fn sqlite_database() -> (TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.db");
    let config = DatabaseConfig {
        url: format!("sqlite://{}?mode=rwc", path.display()),
        dialect: None,
        max_connections: 4,
        min_connections: 1,
        connection_timeout_secs: 5,
        show_sql: true,
    };

    let db = Database::connect(&config).await.unwrap();
    for ddl in SCHEMA {
        sqlx::query(ddl).execute(db.pool()).await.unwrap();
    }
    (dir, db)
}

/// Insert `user-1` ..= `user-n` with ids and ages `1..=n`
///
/// Every user is tagged `user`; even ages are also tagged `even`.
pub(crate) async fn seed_users(repo: &UserRepo, ctx: &Context, n: i64) {
    for i in 1..=n {
        let tags = if i % 2 == 0 {
            r#"["user","even"]"#
        } else {
            r#"["user"]"#
        };
        let row = User {
            tags: tags.to_string(),
            ..user(0, &format!("user-{i}"), i)
        };
        repo.create(ctx, &row).await.unwrap();
    }
}
