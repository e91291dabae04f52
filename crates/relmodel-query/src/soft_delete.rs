//! Soft-delete filtering.
//!
//! An entity with a `soft_delete` marker column is never physically removed
//! by a plain delete: the delete becomes an UPDATE stamping the marker, and
//! every default read or update excludes rows whose marker is set.

use chrono::{DateTime, Utc};
use relmodel_core::EntityDef;

use crate::condition::WhereClause;
use crate::dialect::Dialect;
use crate::statement::Fragment;
use crate::write::UpdateBuilder;

/// Soft-delete marker of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftDelete {
    table: &'static str,
    column: &'static str,
}

impl SoftDelete {
    /// The marker of `def`, if it declares one.
    pub fn of(def: &EntityDef) -> Option<Self> {
        def.soft_delete_field().map(|field| Self {
            table: def.table,
            column: field.column_name,
        })
    }

    /// Marker column name.
    pub fn column(&self) -> &'static str {
        self.column
    }

    /// `"<reference>"."<marker>" IS NULL`, where `reference` is the table name
    /// or the alias the table is joined under.
    pub fn guard(&self, dialect: Dialect, reference: Option<&str>) -> Fragment {
        Fragment::new(
            format!(
                "{} IS NULL",
                dialect.qualified(reference.unwrap_or(self.table), self.column)
            ),
            Vec::new(),
        )
    }

    /// Rewrite a delete of the rows matching `filter` into an UPDATE stamping
    /// the marker with `now`. Rows already marked are left alone.
    pub fn delete_as_update(
        &self,
        dialect: Dialect,
        filter: WhereClause,
        now: DateTime<Utc>,
    ) -> UpdateBuilder {
        UpdateBuilder::new(self.table)
            .set(self.column, now)
            .filter_clause(filter)
            .guard(self.guard(dialect, None))
    }
}

/// Guard for `def` unless the read is unscoped.
pub fn scope_guard(
    def: &EntityDef,
    dialect: Dialect,
    reference: Option<&str>,
    unscoped: bool,
) -> Option<Fragment> {
    if unscoped {
        return None;
    }
    SoftDelete::of(def).map(|marker| marker.guard(dialect, reference))
}
