//! Core types and traits for relmodel.
//!
//! `relmodel-core` is the **foundation layer** for the workspace. It defines the
//! traits and data types every other crate builds on.
//!
//! # Role In The Architecture
//!
//! - **Contract layer**: `Entity` and `Connection` are the primary traits implemented by
//!   user entities (through the derive macro) and database drivers.
//! - **Data model**: `Value`, `Row` and `Record` represent query inputs and outputs and
//!   are shared across the query, schema, session and driver crates.
//! - **Metadata**: `EntityDef`, `FieldInfo` and `RelationshipInfo` describe how an entity
//!   maps onto tables, columns and relationships.
//!
//! # Who Uses This Crate
//!
//! - `relmodel-macros` generates `Entity` implementations defined here.
//! - `relmodel-schema` registers `EntityDef`s and resolves relationships.
//! - `relmodel-query` consumes `EntityDef` metadata and `Value` to build SQL.
//! - `relmodel-session` runs statements through `Connection` and maps `Row`s into `Record`s.
//! - `relmodel-sqlite` implements `Connection` on top of `rusqlite`.
//!
//! Most applications should use the `relmodel` facade; reach for `relmodel-core` directly
//! when writing drivers or advanced integrations.

pub mod connection;
pub mod entity;
pub mod error;
pub mod field;
pub mod identifiers;
pub mod record;
pub mod relationship;
pub mod row;
pub mod value;

pub use connection::Connection;
pub use entity::{Entity, EntityDef};
pub use error::{ConstraintKind, Error, PoolError, PoolErrorKind, Result};
pub use field::{EmbeddedInfo, FieldInfo, FieldPermission, TimeFormat};
pub use identifiers::{default_table_name, is_valid_identifier, to_snake_case, validate_identifier};
pub use record::{FromRecord, Record};
pub use relationship::{LinkTableInfo, RelationshipInfo, RelationshipKind};
pub use row::Row;
pub use value::{FromValue, ToValue, Value, ValueKey};

/// Build a `Vec<Value>` of bound parameters.
///
/// ```
/// use relmodel_core::{params, Value};
///
/// let p = params!["eko", 10_i64, Value::list(["1", "2"])];
/// assert_eq!(p.len(), 3);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::Value>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::Value::from($value)),+]
    };
}

/// Build a [`Row`] from `column => value` pairs, used for map conditions,
/// map updates and table-handle inserts.
///
/// ```
/// use relmodel_core::row;
///
/// let r = row! { "first_name" => "Eko", "middle_name" => "" };
/// assert_eq!(r.len(), 2);
/// ```
#[macro_export]
macro_rules! row {
    () => {
        $crate::Row::new()
    };
    ($($column:expr => $value:expr),+ $(,)?) => {{
        let mut row = $crate::Row::new();
        $(row.set($column, $crate::Value::from($value));)+
        row
    }};
}
