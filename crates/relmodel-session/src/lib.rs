//! Execution engine for relmodel.
//!
//! `relmodel-session` is the **runtime layer**: it turns entity operations
//! into statements, runs them on pooled connections and maps rows back into
//! records.
//!
//! # Role In The Architecture
//!
//! - **Database handle**: [`Database`] owns the pool, the schema registry and
//!   the [`DatabaseConfig`]; [`Tx`] is an open transaction with savepoints.
//! - **Entity surface**: the [`Executor`] trait gives both the same
//!   operations: `create`, `save`, `delete`, `model::<E>()` queries,
//!   associations, join tables, table handles and raw SQL.
//! - **Associations**: eager joins, batched preloads, upsert-on-create of
//!   related records and the association mode.
//! - **Diagnostics**: statements are logged through `tracing`, slow ones warned
//!   about, and optionally recorded by the [`StatementTracker`].
//!
//! # Example
//!
//! ```ignore
//! use relmodel_session::{Database, DatabaseConfig, Executor};
//!
//! let db = Database::connect(DatabaseConfig::default(), registry, || {
//!     SqliteConnection::open("app.db")
//! })?;
//!
//! let mut user = User { name: "jinzhu".into(), ..Default::default() };
//! db.create(&mut user)?;
//!
//! let users: Vec<User> = db
//!     .model::<User>()
//!     .filter(("age > ?", params![18]))
//!     .preload("addresses")
//!     .order("name")
//!     .find()?;
//! ```

pub mod association;
pub mod config;
pub mod database;
pub mod engine;
pub mod executor;
pub mod mapping;
pub mod persist;
pub mod preload;
pub mod query;
pub mod raw;
pub mod tracker;

pub use association::{Association, JoinTable};
pub use config::DatabaseConfig;
pub use database::{Database, Tx};
pub use engine::{Access, Context, Engine};
pub use executor::Executor;
pub use persist::{CreateOptions, OnConflict, SaveOptions};
pub use preload::{PRELOAD_CHUNK, PreloadRequest};
pub use query::Query;
pub use raw::{Raw, Table};
pub use tracker::{CallSite, LoadStats, StatementTracker, TrackedStatement};
