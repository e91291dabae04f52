//! SQL statement building for relmodel.
//!
//! `relmodel-query` turns predicates, projections and write requests into
//! immutable [`Statement`]s for a given [`Dialect`]:
//!
//! - [`Condition`] and [`WhereClause`] for predicates (raw, map and struct forms)
//! - [`Select`] for reads, with joins, grouping, paging and row locks
//! - [`InsertBuilder`], [`UpdateBuilder`] and [`DeleteBuilder`] for writes,
//!   including upserts via [`OnConflict`]
//! - [`SoftDelete`] for the deleted-marker guard and delete rewriting
//!
//! Builders never execute anything; the session crate runs the statements.
//!
//! # Example
//!
//! ```ignore
//! let stmt = Select::new("users")
//!     .filter(Fragment::new("id IN ?", params![Value::list(["1", "2"])]))
//!     .build(Dialect::Sqlite);
//! // SELECT "users".* FROM "users" WHERE (id IN (?1, ?2))
//! ```

pub mod condition;
pub mod dialect;
pub mod select;
pub mod soft_delete;
pub mod statement;
pub mod write;

pub use condition::{Condition, WhereClause};
pub use dialect::{Dialect, LockStrength};
pub use select::{Join, Select};
pub use soft_delete::{SoftDelete, scope_guard};
pub use statement::{Fragment, Statement, expand_lists};
pub use write::{DeleteBuilder, InsertBuilder, OnConflict, UpdateBuilder};
