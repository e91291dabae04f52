//! Shared models and a SQLite schema for the integration tests.
#![allow(dead_code)]

use std::ops::Deref;

use chrono::{DateTime, Utc};
use relmodel::prelude::*;
use tempfile::TempDir;

#[derive(Entity, Debug, Clone, Default, PartialEq)]
pub struct Name {
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
}

#[derive(Entity, Debug, Clone, Default, PartialEq)]
#[relmodel(table = "users")]
pub struct User {
    #[relmodel(primary_key, create_only)]
    pub id: String,
    pub password: String,
    #[relmodel(embedded)]
    pub name: Name,
    #[relmodel(auto_create_time, create_only)]
    pub created_at: DateTime<Utc>,
    #[relmodel(auto_update_time)]
    pub updated_at: DateTime<Utc>,
    #[relmodel(ignore)]
    pub information: String,
    #[relmodel(has_one, foreign_key = "user_id")]
    pub wallet: Option<Wallet>,
    #[relmodel(has_many, foreign_key = "user_id")]
    pub addresses: Vec<Address>,
    #[relmodel(
        many_to_many = "user_like_product",
        join_foreign_key = "user_id",
        join_references = "product_id"
    )]
    pub like_products: Vec<Product>,
    #[relmodel(has_many, foreign_key = "user_id")]
    pub todos: Vec<Todo>,
}

#[derive(Entity, Debug, Clone, Default, PartialEq)]
#[relmodel(table = "wallets")]
pub struct Wallet {
    #[relmodel(primary_key)]
    pub id: String,
    pub user_id: String,
    pub balance: i64,
    #[relmodel(auto_create_time)]
    pub created_at: DateTime<Utc>,
    #[relmodel(auto_update_time)]
    pub updated_at: DateTime<Utc>,
    #[relmodel(belongs_to, foreign_key = "user_id", references = "id")]
    pub user: Option<Box<User>>,
}

#[derive(Entity, Debug, Clone, Default, PartialEq)]
#[relmodel(table = "addresses")]
pub struct Address {
    #[relmodel(primary_key, auto_increment)]
    pub id: i64,
    pub user_id: String,
    pub address: String,
    #[relmodel(auto_create_time)]
    pub created_at: DateTime<Utc>,
    #[relmodel(auto_update_time)]
    pub updated_at: DateTime<Utc>,
    #[relmodel(belongs_to, foreign_key = "user_id", references = "id")]
    pub user: Option<Box<User>>,
}

#[derive(Entity, Debug, Clone, Default, PartialEq)]
#[relmodel(table = "products")]
pub struct Product {
    #[relmodel(primary_key)]
    pub id: String,
    pub name: String,
    pub price: i64,
    #[relmodel(auto_create_time)]
    pub created_at: DateTime<Utc>,
    #[relmodel(auto_update_time)]
    pub updated_at: DateTime<Utc>,
    #[relmodel(
        many_to_many = "user_like_product",
        join_foreign_key = "product_id",
        join_references = "user_id"
    )]
    pub liked_by_users: Vec<User>,
}

#[derive(Entity, Debug, Clone, Default, PartialEq)]
#[relmodel(table = "todos")]
pub struct Todo {
    #[relmodel(embedded)]
    pub model: BaseModel,
    pub user_id: String,
    pub title: String,
    pub description: String,
}

#[derive(Entity, Debug, Clone, Default, PartialEq)]
#[relmodel(table = "user_logs")]
pub struct UserLog {
    #[relmodel(primary_key, auto_increment)]
    pub id: i64,
    pub user_id: String,
    pub action: String,
    #[relmodel(auto_create_time = "milli")]
    pub created_at: i64,
    #[relmodel(auto_update_time = "milli")]
    pub updated_at: i64,
}

pub const SCHEMA: &str = "
CREATE TABLE users (
    id TEXT PRIMARY KEY,
    password TEXT NOT NULL DEFAULT '',
    first_name TEXT NOT NULL DEFAULT '',
    middle_name TEXT NOT NULL DEFAULT '',
    last_name TEXT NOT NULL DEFAULT '',
    created_at TEXT,
    updated_at TEXT
);
CREATE TABLE wallets (
    id TEXT PRIMARY KEY,
    user_id TEXT REFERENCES users (id),
    balance INTEGER NOT NULL DEFAULT 0,
    created_at TEXT,
    updated_at TEXT
);
CREATE TABLE addresses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT REFERENCES users (id),
    address TEXT NOT NULL DEFAULT '',
    created_at TEXT,
    updated_at TEXT
);
CREATE TABLE products (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    price INTEGER NOT NULL DEFAULT 0,
    created_at TEXT,
    updated_at TEXT
);
CREATE TABLE user_like_product (
    user_id TEXT NOT NULL REFERENCES users (id),
    product_id TEXT NOT NULL REFERENCES products (id),
    PRIMARY KEY (user_id, product_id)
);
CREATE TABLE todos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL DEFAULT '',
    title TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    created_at TEXT,
    updated_at TEXT,
    deleted_at TEXT
);
CREATE TABLE user_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL DEFAULT '',
    action TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL DEFAULT 0
);
";

/// A database over a temporary file; the file lives as long as this value.
pub struct TestDb {
    pub db: Database<SqliteConnection>,
    _dir: TempDir,
}

impl Deref for TestDb {
    type Target = Database<SqliteConnection>;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Builder with every model registered.
pub fn builder() -> DatabaseBuilder {
    DatabaseBuilder::new()
        .register::<User>()
        .and_then(|b| b.register::<Wallet>())
        .and_then(|b| b.register::<Address>())
        .and_then(|b| b.register::<Product>())
        .and_then(|b| b.register::<Todo>())
        .and_then(|b| b.register::<UserLog>())
        .expect("register models")
}

pub fn open_with(builder: DatabaseBuilder) -> TestDb {
    let dir = tempfile::tempdir().expect("temp dir");
    let db = builder
        .open_sqlite(dir.path().join("test.db"))
        .expect("open database");
    db.execute_batch(SCHEMA).expect("create schema");
    TestDb { db, _dir: dir }
}

pub fn open() -> TestDb {
    open_with(builder())
}

pub fn user(id: &str, first: &str, last: &str) -> User {
    User {
        id: id.to_string(),
        password: "rahasia".to_string(),
        name: Name {
            first_name: first.to_string(),
            middle_name: String::new(),
            last_name: last.to_string(),
        },
        ..Default::default()
    }
}

pub fn seed_users(db: &Database<SqliteConnection>, n: usize) -> Vec<User> {
    (1..=n)
        .map(|i| {
            let mut u = user(&i.to_string(), &format!("User {i}"), "Test");
            db.create(&mut u).expect("create user");
            u
        })
        .collect()
}

pub fn count_rows(db: &Database<SqliteConnection>, table: &str) -> u64 {
    db.table(table)
        .and_then(|t| t.count(Row::new()))
        .expect("count rows")
}
