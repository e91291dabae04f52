//! Entity definitions and the `Entity` trait.
//!
//! An [`EntityDef`] is the runtime description of one mapped type: its table,
//! its columns (with embedded sub-structures already flattened in), the
//! fields that are ignored and its relationship declarations. The derive
//! macro builds one for every `#[derive(Entity)]` type.
//!
//! # Example
//!
//! ```ignore
//! use relmodel::prelude::*;
//!
//! #[derive(Entity, Debug, Default)]
//! #[relmodel(table = "wallets")]
//! struct Wallet {
//!     #[relmodel(primary_key)]
//!     id: String,
//!     user_id: String,
//!     balance: i64,
//!     #[relmodel(belongs_to, foreign_key = "user_id", references = "id")]
//!     user: Option<Box<User>>,
//! }
//! ```

use crate::error::Result;
use crate::field::{EmbeddedInfo, FieldInfo};
use crate::record::{FromRecord, Record};
use crate::relationship::RelationshipInfo;
use crate::value::Value;

/// Runtime description of a mapped entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDef {
    /// Entity (type) name.
    pub name: &'static str,
    /// Table name.
    pub table: &'static str,
    /// Column mappings, embedded columns flattened in.
    pub fields: Vec<FieldInfo>,
    /// Embedded sub-structures.
    pub embedded: Vec<EmbeddedInfo>,
    /// Fields that have no column.
    pub ignored: Vec<&'static str>,
    /// Relationship declarations.
    pub relationships: Vec<RelationshipInfo>,
}

impl EntityDef {
    /// Empty definition for `name` stored in `table`.
    pub fn new(name: &'static str, table: &'static str) -> Self {
        Self {
            name,
            table,
            fields: Vec::new(),
            embedded: Vec::new(),
            ignored: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Add a column.
    pub fn field(mut self, field: FieldInfo) -> Self {
        self.fields.push(field);
        self
    }

    /// Flatten an embedded sub-structure's columns into this definition.
    pub fn embed(mut self, name: &'static str, inner: EntityDef) -> Self {
        let columns = inner.fields.iter().map(|f| f.column_name).collect();
        self.fields.extend(inner.fields.into_iter().map(|f| f.embedded_in(name)));
        self.embedded.push(EmbeddedInfo {
            name,
            type_name: inner.name,
            columns,
        });
        self
    }

    /// Declare a field without a column.
    pub fn ignore(mut self, name: &'static str) -> Self {
        self.ignored.push(name);
        self
    }

    /// Declare a relationship.
    pub fn relationship(mut self, info: RelationshipInfo) -> Self {
        self.relationships.push(info);
        self
    }

    /// Primary key fields in declaration order.
    pub fn primary_key(&self) -> Vec<&FieldInfo> {
        self.fields.iter().filter(|f| f.primary_key).collect()
    }

    /// Primary key column names.
    pub fn primary_key_columns(&self) -> Vec<&'static str> {
        self.primary_key().iter().map(|f| f.column_name).collect()
    }

    /// The auto-increment key column, if any.
    pub fn auto_increment_field(&self) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.auto_increment)
    }

    /// The soft-delete marker column, if any.
    pub fn soft_delete_field(&self) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.soft_delete)
    }

    /// Field by column name.
    pub fn field_by_column(&self, column: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.column_name == column)
    }

    /// Whether a column is mapped.
    pub fn has_column(&self, column: &str) -> bool {
        self.field_by_column(column).is_some()
    }

    /// All column names in declaration order.
    pub fn column_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.column_name).collect()
    }

    /// Relationship by field name.
    pub fn find_relationship(&self, name: &str) -> Option<&RelationshipInfo> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Primary key values of a record, in key order.
    pub fn key_values(&self, record: &Record) -> Vec<Value> {
        self.primary_key()
            .iter()
            .map(|f| record.get_or_null(f.column_name))
            .collect()
    }

    /// Whether any primary key value of `record` is zero.
    pub fn has_zero_key(&self, record: &Record) -> bool {
        let keys = self.key_values(record);
        keys.is_empty() || keys.iter().any(Value::is_zero)
    }
}

/// A typed mapped entity.
///
/// Implemented by `#[derive(Entity)]`. Typed instances move through the engine
/// as [`Record`]s: `to_record` captures column values and loaded relations,
/// `apply_record` writes database-assigned values (keys, timestamps, loaded
/// relations) back onto an existing instance.
pub trait Entity: FromRecord + Send + Sync + 'static {
    /// Entity name used by the registry.
    const NAME: &'static str;

    /// Build the entity definition.
    fn definition() -> EntityDef;

    /// Capture column values and populated relations.
    fn to_record(&self) -> Record;

    /// Overwrite fields whose columns or relations are present in `record`.
    fn apply_record(&mut self, record: &Record) -> Result<()>;
}
