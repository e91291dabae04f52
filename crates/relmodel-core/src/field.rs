//! Field and column definitions.

use chrono::{DateTime, Utc};

use crate::value::Value;

/// Which write statements a column takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldPermission {
    /// Written on INSERT and UPDATE.
    #[default]
    ReadWrite,
    /// Written on INSERT only, never appears in an UPDATE SET list.
    CreateOnly,
    /// Written on UPDATE only, never appears in an INSERT column list.
    UpdateOnly,
}

/// Representation used for automatically maintained timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeFormat {
    /// A timestamp value.
    #[default]
    Timestamp,
    /// Integer seconds since the Unix epoch.
    UnixSeconds,
    /// Integer milliseconds since the Unix epoch.
    UnixMillis,
}

impl TimeFormat {
    /// The value to store for `now` in this format.
    pub fn value_at(self, now: DateTime<Utc>) -> Value {
        match self {
            TimeFormat::Timestamp => Value::Timestamp(now),
            TimeFormat::UnixSeconds => Value::BigInt(now.timestamp()),
            TimeFormat::UnixMillis => Value::BigInt(now.timestamp_millis()),
        }
    }

    /// Parse the attribute spelling: `"milli"`, `"unix"` or empty.
    pub fn from_attr(s: &str) -> Option<Self> {
        match s {
            "" | "timestamp" => Some(TimeFormat::Timestamp),
            "unix" | "second" | "seconds" => Some(TimeFormat::UnixSeconds),
            "milli" | "millis" => Some(TimeFormat::UnixMillis),
            _ => None,
        }
    }
}

/// Metadata about an entity field/column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Rust field name
    pub name: &'static str,
    /// Database column name (may differ from field name)
    pub column_name: &'static str,
    /// Whether this field is nullable
    pub nullable: bool,
    /// Whether this is (part of) the primary key
    pub primary_key: bool,
    /// Whether the database assigns this value on insert
    pub auto_increment: bool,
    /// INSERT/UPDATE participation
    pub permission: FieldPermission,
    /// Written with the current time on insert
    pub auto_create_time: Option<TimeFormat>,
    /// Written with the current time on insert and update
    pub auto_update_time: Option<TimeFormat>,
    /// The soft-delete marker column
    pub soft_delete: bool,
    /// Name of the embedded field this column was flattened from
    pub embedded_in: Option<&'static str>,
}

impl FieldInfo {
    /// Create a new field info with minimal required data.
    pub const fn new(name: &'static str, column_name: &'static str) -> Self {
        Self {
            name,
            column_name,
            nullable: false,
            primary_key: false,
            auto_increment: false,
            permission: FieldPermission::ReadWrite,
            auto_create_time: None,
            auto_update_time: None,
            soft_delete: false,
            embedded_in: None,
        }
    }

    /// Set the database column name.
    pub const fn column(mut self, name: &'static str) -> Self {
        self.column_name = name;
        self
    }

    /// Set nullable flag.
    pub const fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Set primary key flag.
    pub const fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    /// Set auto-increment flag.
    pub const fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self
    }

    /// Set write permission.
    pub const fn permission(mut self, value: FieldPermission) -> Self {
        self.permission = value;
        self
    }

    /// Mark as creation timestamp.
    pub const fn auto_create_time(mut self, format: Option<TimeFormat>) -> Self {
        self.auto_create_time = format;
        self
    }

    /// Mark as update timestamp.
    pub const fn auto_update_time(mut self, format: Option<TimeFormat>) -> Self {
        self.auto_update_time = format;
        self
    }

    /// Mark as the soft-delete marker.
    pub const fn soft_delete(mut self, value: bool) -> Self {
        self.soft_delete = value;
        self
    }

    /// Record the embedded field this column came from.
    pub const fn embedded_in(mut self, field: &'static str) -> Self {
        self.embedded_in = Some(field);
        self
    }

    /// Whether the column appears in INSERT column lists.
    pub const fn insertable(&self) -> bool {
        !matches!(self.permission, FieldPermission::UpdateOnly)
    }

    /// Whether the column appears in UPDATE SET lists.
    pub const fn updatable(&self) -> bool {
        !self.primary_key && !matches!(self.permission, FieldPermission::CreateOnly)
    }

    /// Timestamp value to write on insert, if this column is time-managed.
    pub fn create_time_value(&self, now: DateTime<Utc>) -> Option<Value> {
        self.auto_create_time
            .or(self.auto_update_time)
            .map(|format| format.value_at(now))
    }

    /// Timestamp value to write on update, if this column is time-managed.
    pub fn update_time_value(&self, now: DateTime<Utc>) -> Option<Value> {
        self.auto_update_time.map(|format| format.value_at(now))
    }
}

/// An embedded sub-structure flattened into the owning entity's columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedInfo {
    /// Field name on the owning entity.
    pub name: &'static str,
    /// Entity name of the embedded type.
    pub type_name: &'static str,
    /// Columns it contributes, in declaration order.
    pub columns: Vec<&'static str>,
}
