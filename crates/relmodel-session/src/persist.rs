//! Entity writes: create, save, delete and upserting related records.
//!
//! Related records carried by an entity are written in the same operation:
//!
//! 1. belongs-to targets first, then the owner's foreign key is set from them;
//! 2. the owner row;
//! 3. has-one/has-many children with their foreign key set to the owner key;
//! 4. many-to-many targets, then their join rows.
//!
//! A related record whose key already exists is left alone (`ON CONFLICT DO
//! NOTHING`) unless `overwrite_associations` is set.

use chrono::{DateTime, Utc};
use relmodel_core::{
    EntityDef, Error, FieldPermission, Record, RelationshipKind, Result, Row, Value,
};
use relmodel_query::{
    DeleteBuilder, InsertBuilder, OnConflict as InsertConflict, SoftDelete, UpdateBuilder,
    WhereClause,
};
use relmodel_schema::{HookKind, JoinSpec, ResolvedRelation};

use crate::engine::Engine;
use crate::mapping::key_predicate;

/// What an INSERT does when the key already exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnConflict {
    /// Keep the existing row.
    DoNothing,
    /// Overwrite every updatable column of the existing row.
    UpdateAll,
    /// Overwrite the named columns of the existing row.
    UpdateColumns(Vec<String>),
}

/// Options of [`create_with`](crate::Executor::create_with).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOptions {
    /// Conflict handling of the entity's own INSERT.
    pub on_conflict: Option<OnConflict>,
    /// Do not write related records.
    pub skip_associations: bool,
    /// Overwrite existing related records instead of leaving them alone.
    pub overwrite_associations: bool,
}

impl CreateOptions {
    /// Default options: plain INSERT, related records upserted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the conflict handling.
    pub fn on_conflict(mut self, strategy: OnConflict) -> Self {
        self.on_conflict = Some(strategy);
        self
    }

    /// Skip related records.
    pub fn skip_associations(mut self) -> Self {
        self.skip_associations = true;
        self
    }

    /// Overwrite existing related records.
    pub fn overwrite_associations(mut self) -> Self {
        self.overwrite_associations = true;
        self
    }

    fn for_associations(&self) -> Self {
        let strategy = if self.overwrite_associations {
            OnConflict::UpdateAll
        } else {
            OnConflict::DoNothing
        };
        Self {
            on_conflict: Some(strategy),
            skip_associations: false,
            overwrite_associations: self.overwrite_associations,
        }
    }
}

/// Options of [`save_with`](crate::Executor::save_with).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// When the save ends up inserting and the key exists, update the
    /// existing row instead of failing.
    pub on_conflict_update_all: bool,
    /// Do not write related records.
    pub skip_associations: bool,
    /// Overwrite existing related records instead of leaving them alone.
    pub overwrite_associations: bool,
}

impl SaveOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert instead of failing on a key conflict.
    pub fn on_conflict_update_all(mut self) -> Self {
        self.on_conflict_update_all = true;
        self
    }

    /// Skip related records.
    pub fn skip_associations(mut self) -> Self {
        self.skip_associations = true;
        self
    }

    /// Overwrite existing related records.
    pub fn overwrite_associations(mut self) -> Self {
        self.overwrite_associations = true;
        self
    }

    fn create_options(&self) -> CreateOptions {
        CreateOptions {
            on_conflict: self.on_conflict_update_all.then_some(OnConflict::UpdateAll),
            skip_associations: self.skip_associations,
            overwrite_associations: self.overwrite_associations,
        }
    }
}

/// Columns an `UpdateAll` upsert overwrites: updatable columns, creation
/// timestamps excluded.
fn update_all_columns(def: &EntityDef) -> Vec<String> {
    def.fields
        .iter()
        .filter(|f| f.updatable())
        .filter(|f| f.auto_create_time.is_none() || f.auto_update_time.is_some())
        .map(|f| f.column_name.to_string())
        .collect()
}

fn insert_conflict(def: &EntityDef, strategy: Option<&OnConflict>) -> Option<InsertConflict> {
    let target = || {
        def.primary_key_columns()
            .into_iter()
            .map(str::to_string)
            .collect()
    };
    match strategy? {
        OnConflict::DoNothing => Some(InsertConflict::DoNothing),
        OnConflict::UpdateAll => Some(InsertConflict::DoUpdate {
            columns: update_all_columns(def),
            target: target(),
        }),
        OnConflict::UpdateColumns(columns) => Some(InsertConflict::DoUpdate {
            columns: columns.clone(),
            target: target(),
        }),
    }
}

/// Stamp time-managed columns that are still zero.
fn stamp_create_times(def: &EntityDef, record: &mut Record, now: DateTime<Utc>) {
    for field in &def.fields {
        if let Some(value) = field.create_time_value(now) {
            if record.get(field.column_name).is_none_or(Value::is_zero) {
                record.set(field.column_name, value);
            }
        }
    }
}

/// Stamp update-time columns unconditionally.
fn stamp_update_times(def: &EntityDef, record: &mut Record, now: DateTime<Utc>) {
    for field in &def.fields {
        if let Some(value) = field.update_time_value(now) {
            record.set(field.column_name, value);
        }
    }
}

/// Whether the auto-increment column of `record` still needs a value.
fn needs_generated_key(def: &EntityDef, record: &Record) -> bool {
    def.auto_increment_field()
        .is_some_and(|f| record.get(f.column_name).is_none_or(Value::is_zero))
}

/// INSERT column list and values for `record`.
fn insert_values(def: &EntityDef, record: &Record) -> (Vec<&'static str>, Vec<Value>) {
    let skip_generated = needs_generated_key(def, record);
    def.fields
        .iter()
        .filter(|f| f.insertable())
        .filter(|f| !(skip_generated && f.auto_increment))
        .map(|f| (f.column_name, record.get_or_null(f.column_name)))
        .unzip()
}

fn has_related(def: &EntityDef, record: &Record) -> bool {
    def.relationships
        .iter()
        .any(|r| record.relation(r.name).is_some_and(|rs| !rs.is_empty()))
}

impl Engine<'_> {
    /// Insert `record` as `def`, with hooks, timestamps, related records and
    /// auto-increment back-fill.
    pub(crate) fn create_record(
        &mut self,
        def: &EntityDef,
        record: &mut Record,
        options: &CreateOptions,
    ) -> Result<u64> {
        let hooks = self.registry().hooks();
        hooks.run(def.name, HookKind::BeforeCreate, record)?;

        if !options.skip_associations {
            self.save_parents(def, record, options)?;
        }
        stamp_create_times(def, record, Utc::now());

        let (columns, values) = insert_values(def, record);
        let stmt = InsertBuilder::new(def.table)
            .columns(columns)
            .row(values)
            .on_conflict(insert_conflict(def, options.on_conflict.as_ref()))
            .build(self.dialect())?;
        let generated = needs_generated_key(def, record);
        let (affected, last_id) = self.insert(&stmt)?;
        if generated && affected > 0 {
            if let (Some(field), Some(id)) = (def.auto_increment_field(), last_id) {
                record.set(field.column_name, id);
            }
        }
        tracing::debug!(entity = def.name, affected, "Created record");

        if !options.skip_associations {
            self.save_children(def, record, options)?;
        }
        hooks.run(def.name, HookKind::AfterCreate, record)?;
        Ok(affected)
    }

    /// Insert many records, batching rows that need no per-row work.
    pub(crate) fn create_records(
        &mut self,
        def: &EntityDef,
        records: &mut [Record],
        options: &CreateOptions,
        batch_size: usize,
    ) -> Result<u64> {
        let mut affected = 0;
        let mut batched = Vec::new();
        for (i, record) in records.iter_mut().enumerate() {
            let per_row = needs_generated_key(def, record)
                || (!options.skip_associations && has_related(def, record));
            if per_row {
                affected += self.create_record(def, record, options)?;
            } else {
                batched.push(i);
            }
        }
        if batched.is_empty() {
            return Ok(affected);
        }

        let hooks = self.registry().hooks();
        let now = Utc::now();
        for &i in &batched {
            hooks.run(def.name, HookKind::BeforeCreate, &mut records[i])?;
            stamp_create_times(def, &mut records[i], now);
        }
        let conflict = insert_conflict(def, options.on_conflict.as_ref());
        for chunk in batched.chunks(batch_size.max(1)) {
            let mut builder = InsertBuilder::new(def.table)
                .columns(def.fields.iter().filter(|f| f.insertable()).map(|f| f.column_name))
                .on_conflict(conflict.clone());
            for &i in chunk {
                builder = builder.row(insert_values(def, &records[i]).1);
            }
            let (n, _) = self.insert(&builder.build(self.dialect())?)?;
            tracing::debug!(entity = def.name, rows = chunk.len(), affected = n, "Created batch");
            affected += n;
        }
        for &i in &batched {
            hooks.run(def.name, HookKind::AfterCreate, &mut records[i])?;
        }
        Ok(affected)
    }

    /// Update by primary key, or create when the key is zero or matches no row.
    pub(crate) fn save_record(
        &mut self,
        def: &EntityDef,
        record: &mut Record,
        options: &SaveOptions,
    ) -> Result<u64> {
        let create = options.create_options();
        if def.has_zero_key(record) {
            return self.create_record(def, record, &create);
        }

        let hooks = self.registry().hooks();
        hooks.run(def.name, HookKind::BeforeUpdate, record)?;
        let related = create.for_associations();
        if !options.skip_associations {
            self.save_parents(def, record, &related)?;
        }
        stamp_update_times(def, record, Utc::now());

        let mut update = UpdateBuilder::new(def.table);
        for field in def.fields.iter().filter(|f| f.updatable()) {
            let value = record.get_or_null(field.column_name);
            // An unset creation time must not blank the stored one.
            let creation_only = field.auto_create_time.is_some() && field.auto_update_time.is_none();
            if creation_only && value.is_zero() {
                continue;
            }
            update = update.set(field.column_name, value);
        }
        if update.is_empty() {
            return self.create_record(def, record, &create);
        }
        let stmt = update
            .filter(key_predicate(def, record, self.dialect())?)
            .build(self.dialect())?;
        let affected = self.execute(&stmt)?;
        if affected == 0 {
            tracing::debug!(entity = def.name, "Save matched no row, creating");
            return self.create_record(def, record, &create);
        }
        if !options.skip_associations {
            self.save_children(def, record, &related)?;
        }
        Ok(affected)
    }

    /// Delete by primary key; soft when `def` has a marker and `permanent` is off.
    pub(crate) fn delete_record(
        &mut self,
        def: &EntityDef,
        record: &mut Record,
        permanent: bool,
    ) -> Result<u64> {
        if def.has_zero_key(record) {
            return Err(Error::MissingWhereClause("DELETE"));
        }
        let dialect = self.dialect();
        let mut filter = WhereClause::new();
        filter.and(key_predicate(def, record, dialect)?);
        match SoftDelete::of(def).filter(|_| !permanent) {
            Some(marker) => {
                let now = Utc::now();
                let stmt = marker.delete_as_update(dialect, filter, now).build(dialect)?;
                let affected = self.execute(&stmt)?;
                record.set(marker.column(), now);
                tracing::debug!(entity = def.name, affected, "Soft deleted record");
                Ok(affected)
            }
            None => {
                let stmt = DeleteBuilder::new(def.table)
                    .filter_clause(filter)
                    .build(dialect)?;
                let affected = self.execute(&stmt)?;
                tracing::debug!(entity = def.name, affected, "Deleted record");
                Ok(affected)
            }
        }
    }

    /// UPDATE `sets` on the rows matching `filter`.
    ///
    /// Unknown columns are rejected, create-only columns dropped and
    /// update-time columns stamped when not set explicitly.
    pub(crate) fn update_rows(
        &mut self,
        def: &EntityDef,
        filter: WhereClause,
        sets: Row,
        allow_global: bool,
        unscoped: bool,
    ) -> Result<u64> {
        let dialect = self.dialect();
        let mut update = UpdateBuilder::new(def.table)
            .filter_clause(filter)
            .allow_global(allow_global);
        for (column, value) in sets.iter() {
            let Some(field) = def.field_by_column(column) else {
                return Err(Error::Query(format!(
                    "entity `{}` has no column `{}`",
                    def.name, column
                )));
            };
            if field.permission == FieldPermission::CreateOnly {
                tracing::debug!(entity = def.name, column, "Skipping create-only column");
                continue;
            }
            update = update.set(column, value.clone());
        }
        if update.is_empty() {
            return Err(Error::Query(format!(
                "update of `{}` sets no columns",
                def.name
            )));
        }
        let now = Utc::now();
        for field in &def.fields {
            if let Some(value) = field.update_time_value(now) {
                if !sets.contains(field.column_name) {
                    update = update.set(field.column_name, value);
                }
            }
        }
        if let Some(guard) = relmodel_query::scope_guard(def, dialect, None, unscoped) {
            update = update.guard(guard);
        }
        let affected = self.execute(&update.build(dialect)?)?;
        tracing::debug!(entity = def.name, affected, "Updated rows");
        Ok(affected)
    }

    /// Delete the rows matching `filter`; soft when `def` has a marker and
    /// `permanent` is off.
    pub(crate) fn delete_rows(
        &mut self,
        def: &EntityDef,
        filter: WhereClause,
        allow_global: bool,
        permanent: bool,
        unscoped: bool,
    ) -> Result<u64> {
        if filter.is_empty() && !allow_global {
            return Err(Error::MissingWhereClause("DELETE"));
        }
        let dialect = self.dialect();
        let stmt = match SoftDelete::of(def).filter(|_| !permanent) {
            Some(marker) if unscoped => UpdateBuilder::new(def.table)
                .set(marker.column(), Utc::now())
                .filter_clause(filter)
                .allow_global(allow_global)
                .build(dialect)?,
            Some(marker) => marker
                .delete_as_update(dialect, filter, Utc::now())
                .allow_global(allow_global)
                .build(dialect)?,
            None => DeleteBuilder::new(def.table)
                .filter_clause(filter)
                .allow_global(allow_global)
                .build(dialect)?,
        };
        let affected = self.execute(&stmt)?;
        tracing::debug!(entity = def.name, affected, permanent, "Deleted rows");
        Ok(affected)
    }

    /// Upsert one related record.
    pub(crate) fn upsert_related(
        &mut self,
        target: &EntityDef,
        record: &mut Record,
        options: &CreateOptions,
    ) -> Result<u64> {
        self.create_record(target, record, &options.for_associations())
    }

    /// Insert a join row, ignoring duplicates.
    pub(crate) fn link(&mut self, join: &JoinSpec, source: Value, target: Value) -> Result<u64> {
        let stmt = InsertBuilder::new(join.table.as_str())
            .columns([join.source_column.as_str(), join.target_column.as_str()])
            .row(vec![source, target])
            .on_conflict_do_nothing()
            .build(self.dialect())?;
        Ok(self.insert(&stmt)?.0)
    }

    fn resolve(&self, def: &EntityDef, name: &str) -> Result<ResolvedRelation> {
        self.registry().relation(def.name, name)
    }

    /// Write belongs-to targets and copy their keys onto `record`.
    fn save_parents(
        &mut self,
        def: &EntityDef,
        record: &mut Record,
        options: &CreateOptions,
    ) -> Result<()> {
        for info in def
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::BelongsTo)
        {
            let Some(mut targets) = record.take_relation(info.name) else {
                continue;
            };
            if let Some(target) = targets.first_mut() {
                let relation = self.resolve(def, info.name)?;
                self.upsert_related(&relation.target, target, options)?;
                let key = target.get_or_null(&relation.target_key);
                if !key.is_null() {
                    record.set(relation.source_key.clone(), key);
                }
            }
            record.set_relation(info.name, targets);
        }
        Ok(())
    }

    /// Write has-one, has-many and many-to-many targets of a stored `record`.
    fn save_children(
        &mut self,
        def: &EntityDef,
        record: &mut Record,
        options: &CreateOptions,
    ) -> Result<()> {
        for info in def
            .relationships
            .iter()
            .filter(|r| r.kind != RelationshipKind::BelongsTo)
        {
            let Some(mut targets) = record.take_relation(info.name) else {
                continue;
            };
            if !targets.is_empty() {
                let relation = self.resolve(def, info.name)?;
                let owner_key = record.get_or_null(&relation.source_key);
                match &relation.join {
                    None => {
                        for target in &mut targets {
                            target.set(relation.target_key.clone(), owner_key.clone());
                            self.upsert_related(&relation.target, target, options)?;
                        }
                    }
                    Some(join) => {
                        for target in &mut targets {
                            self.upsert_related(&relation.target, target, options)?;
                            let target_key = target.get_or_null(&relation.target_key);
                            self.link(join, owner_key.clone(), target_key)?;
                        }
                    }
                }
            }
            record.set_relation(info.name, targets);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmodel_core::{FieldInfo, TimeFormat, row};

    fn log_def() -> EntityDef {
        EntityDef::new("UserLog", "user_logs")
            .field(FieldInfo::new("id", "id").primary_key(true).auto_increment(true))
            .field(FieldInfo::new("user_id", "user_id"))
            .field(
                FieldInfo::new("created_at", "created_at")
                    .auto_create_time(Some(TimeFormat::UnixMillis)),
            )
            .field(
                FieldInfo::new("updated_at", "updated_at")
                    .auto_update_time(Some(TimeFormat::UnixMillis)),
            )
            .field(
                FieldInfo::new("source", "source").permission(FieldPermission::CreateOnly),
            )
            .field(
                FieldInfo::new("touched", "touched").permission(FieldPermission::UpdateOnly),
            )
    }

    #[test]
    fn test_insert_values_skip_zero_auto_increment() {
        let def = log_def();
        let record = Record::from_row(row! { "id" => 0_i64, "user_id" => "u1" });
        let (columns, values) = insert_values(&def, &record);
        assert_eq!(columns, vec!["user_id", "created_at", "updated_at", "source"]);
        assert_eq!(values[0], Value::from("u1"));
        assert_eq!(values[3], Value::Null);

        let explicit = Record::from_row(row! { "id" => 9_i64 });
        let (columns, _) = insert_values(&def, &explicit);
        assert_eq!(columns[0], "id");
        assert!(!columns.contains(&"touched"));
    }

    #[test]
    fn test_create_times_only_fill_zero_columns() {
        let def = log_def();
        let now = Utc::now();
        let mut record = Record::from_row(row! { "created_at" => 5_i64 });
        stamp_create_times(&def, &mut record, now);
        assert_eq!(record.get("created_at"), Some(&Value::BigInt(5)));
        assert_eq!(
            record.get("updated_at"),
            Some(&Value::BigInt(now.timestamp_millis()))
        );
    }

    #[test]
    fn test_update_all_excludes_keys_and_creation_columns() {
        let def = log_def();
        assert_eq!(update_all_columns(&def), vec!["user_id", "updated_at", "touched"]);
        match insert_conflict(&def, Some(&OnConflict::UpdateAll)) {
            Some(InsertConflict::DoUpdate { target, .. }) => assert_eq!(target, vec!["id"]),
            other => panic!("unexpected conflict clause {other:?}"),
        }
        assert_eq!(insert_conflict(&def, None), None);
    }

    #[test]
    fn test_option_builders() {
        let create = CreateOptions::new()
            .on_conflict(OnConflict::DoNothing)
            .skip_associations();
        assert_eq!(create.on_conflict, Some(OnConflict::DoNothing));
        assert!(create.skip_associations);

        let related = CreateOptions::new().overwrite_associations().for_associations();
        assert_eq!(related.on_conflict, Some(OnConflict::UpdateAll));

        let save = SaveOptions::new().on_conflict_update_all();
        assert_eq!(save.create_options().on_conflict, Some(OnConflict::UpdateAll));
    }
}
