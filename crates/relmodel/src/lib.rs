//! relmodel: a small relational persistence mapper.
//!
//! Application structs are mapped onto tables with `#[derive(Entity)]`, then
//! created, queried, updated and deleted through a [`Database`] or an open
//! [`Tx`]:
//!
//! - struct, map and raw-SQL conditions, with zero-valued struct fields
//!   ignored and map values always applied;
//! - belongs-to, has-one, has-many and many-to-many relationships, loaded by
//!   eager join or batched preload and created together with their owner;
//! - soft deletes through a nullable marker column;
//! - `save` as update-or-create, with optional dialect-native upsert;
//! - explicit transactions, savepoints and a bounded connection pool.
//!
//! The facade re-exports the workspace crates; most applications only need
//! the [`prelude`].
//!
//! # Example
//!
//! ```rust,ignore
//! use relmodel::prelude::*;
//!
//! #[derive(Entity, Debug, Default)]
//! #[relmodel(table = "users")]
//! struct User {
//!     #[relmodel(primary_key, auto_increment)]
//!     id: i64,
//!     name: String,
//!     #[relmodel(has_many, foreign_key = "user_id")]
//!     addresses: Vec<Address>,
//!     #[relmodel(soft_delete)]
//!     deleted_at: Option<DateTime<Utc>>,
//! }
//!
//! let db = DatabaseBuilder::new()
//!     .register::<User>()?
//!     .register::<Address>()?
//!     .open_sqlite("app.db")?;
//!
//! let mut user = User { name: "jinzhu".into(), ..Default::default() };
//! db.create(&mut user)?;
//!
//! let found: Vec<User> = db
//!     .model::<User>()
//!     .filter(row! { "name" => "jinzhu" })
//!     .preload("addresses")
//!     .find()?;
//! ```

pub mod builder;
pub mod model;

pub use builder::DatabaseBuilder;
pub use model::BaseModel;

pub use relmodel_core::{
    ConstraintKind, Connection, EmbeddedInfo, Entity, EntityDef, Error, FieldInfo,
    FieldPermission, FromRecord, FromValue, LinkTableInfo, PoolError, PoolErrorKind, Record,
    RelationshipInfo, RelationshipKind, Result, Row, TimeFormat, ToValue, Value, ValueKey,
    default_table_name, params, row, validate_identifier,
};
pub use relmodel_macros::{Entity, FromRecord};
pub use relmodel_pool::{Pool, PoolConfig, PoolStats, PooledConnection};
pub use relmodel_query::{
    Condition, DeleteBuilder, Dialect, Fragment, InsertBuilder, LockStrength, Select,
    Statement, UpdateBuilder,
};
pub use relmodel_schema::{HookKind, Hooks, JoinSpec, Registry, ResolvedRelation};
pub use relmodel_session::{
    Access, Association, CreateOptions, Database, DatabaseConfig, Executor, JoinTable,
    OnConflict, Query, Raw, SaveOptions, StatementTracker, Table, Tx,
};

#[cfg(feature = "sqlite")]
pub use relmodel_sqlite::SqliteConnection;

/// Commonly used items.
pub mod prelude {
    pub use crate::{BaseModel, DatabaseBuilder};
    pub use relmodel_core::{
        Entity, Error, FromRecord, Record, Result, Row, Value, params, row,
    };
    pub use relmodel_macros::{Entity, FromRecord};
    pub use relmodel_pool::PoolConfig;
    pub use relmodel_query::{Condition, Dialect, LockStrength};
    pub use relmodel_schema::Registry;
    pub use relmodel_session::{
        CreateOptions, Database, DatabaseConfig, Executor, OnConflict, SaveOptions, Tx,
    };

    #[cfg(feature = "sqlite")]
    pub use relmodel_sqlite::SqliteConnection;
}
