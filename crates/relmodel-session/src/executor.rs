//! The entity surface shared by [`Database`](crate::Database) and
//! [`Tx`](crate::Tx).
//!
//! A `Database` runs each call on a pooled connection, wrapping writes in a
//! transaction unless `skip_default_transaction` is set; a `Tx` runs every
//! call on its own connection inside its open transaction.

use relmodel_core::{Entity, Error, Result, Value};
use relmodel_query::Fragment;

use crate::association::{Association, JoinTable};
use crate::engine::{Access, Context, Engine};
use crate::mapping::key_predicate;
use crate::persist::{CreateOptions, SaveOptions};
use crate::query::Query;
use crate::raw::{Raw, Table};

/// Source of engines plus the entity operations built on them.
pub trait Executor: Sized {
    /// Shared context.
    fn context(&self) -> &Context;

    /// Run `f` with an engine for one operation.
    fn run<R>(&self, access: Access, f: impl FnOnce(&mut Engine<'_>) -> Result<R>) -> Result<R>;

    // ==================== Queries ====================

    /// Start a query over `E`.
    fn model<E: Entity>(&self) -> Query<'_, Self, E> {
        Query::new(self)
    }

    /// Fetch one `E` by its (single-column) primary key.
    fn get<E: Entity>(&self, key: impl Into<Value>) -> Result<Option<E>> {
        let def = self.context().registry().lookup_type::<E>()?;
        let column = crate::mapping::single_key(&def)?;
        let dialect = self.context().dialect();
        let predicate = Fragment::new(
            format!("{} = ?", dialect.qualified(def.table, column)),
            vec![key.into()],
        );
        match self.model::<E>().filter((predicate.sql, predicate.params)).take() {
            Ok(entity) => Ok(Some(entity)),
            Err(Error::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Raw SELECT with positional parameters.
    fn raw(&self, sql: impl Into<String>, params: Vec<Value>) -> Raw<'_, Self> {
        Raw::new(self, sql.into(), params)
    }

    /// Raw statement with positional parameters; returns affected rows.
    #[tracing::instrument(level = "debug", skip(self, sql, params))]
    fn exec(&self, sql: &str, params: Vec<Value>) -> Result<u64> {
        let stmt = relmodel_query::Statement::finish(
            Fragment::new(sql, params),
            self.context().dialect(),
        );
        self.run(Access::Write, |engine| engine.execute(&stmt))
    }

    /// Untyped handle on `table`.
    fn table(&self, name: &str) -> Result<Table<'_, Self>> {
        Table::new(self, name)
    }

    // ==================== Writes ====================

    /// Insert `entity` with its related records; generated keys and
    /// timestamps are written back.
    fn create<E: Entity>(&self, entity: &mut E) -> Result<u64> {
        self.create_with(entity, &CreateOptions::default())
    }

    /// Insert `entity` with explicit conflict and association handling.
    #[tracing::instrument(level = "debug", skip(self, entity), fields(entity = E::NAME))]
    fn create_with<E: Entity>(&self, entity: &mut E, options: &CreateOptions) -> Result<u64> {
        let def = self.context().registry().lookup_type::<E>()?;
        let mut record = entity.to_record();
        let affected = self.run(Access::Write, |engine| {
            engine.create_record(&def, &mut record, options)
        })?;
        entity.apply_record(&record)?;
        Ok(affected)
    }

    /// Insert many entities in multi-row batches of `create_batch_size`.
    #[tracing::instrument(level = "debug", skip(self, entities), fields(entity = E::NAME, count = entities.len()))]
    fn create_many<E: Entity>(&self, entities: &mut [E]) -> Result<u64> {
        if entities.is_empty() {
            return Ok(0);
        }
        let def = self.context().registry().lookup_type::<E>()?;
        let batch = self.context().config().create_batch_size;
        let mut records: Vec<_> = entities.iter().map(Entity::to_record).collect();
        let affected = self.run(Access::Write, |engine| {
            engine.create_records(&def, &mut records, &CreateOptions::default(), batch)
        })?;
        for (entity, record) in entities.iter_mut().zip(&records) {
            entity.apply_record(record)?;
        }
        Ok(affected)
    }

    /// Update `entity` by primary key, creating it when the key is zero or
    /// matches no row.
    fn save<E: Entity>(&self, entity: &mut E) -> Result<u64> {
        self.save_with(entity, &SaveOptions::default())
    }

    /// `save` with explicit options.
    #[tracing::instrument(level = "debug", skip(self, entity), fields(entity = E::NAME))]
    fn save_with<E: Entity>(&self, entity: &mut E, options: &SaveOptions) -> Result<u64> {
        let def = self.context().registry().lookup_type::<E>()?;
        let mut record = entity.to_record();
        let affected = self.run(Access::Write, |engine| {
            engine.save_record(&def, &mut record, options)
        })?;
        entity.apply_record(&record)?;
        Ok(affected)
    }

    /// Delete `entity` by primary key. Entities with a soft-delete marker get
    /// the marker stamped instead, in the database and on `entity`.
    #[tracing::instrument(level = "debug", skip(self, entity), fields(entity = E::NAME))]
    fn delete<E: Entity>(&self, entity: &mut E) -> Result<u64> {
        let def = self.context().registry().lookup_type::<E>()?;
        let mut record = entity.to_record();
        let affected = self.run(Access::Write, |engine| {
            engine.delete_record(&def, &mut record, false)
        })?;
        entity.apply_record(&record)?;
        Ok(affected)
    }

    /// Physically delete `entity`, marker or not.
    #[tracing::instrument(level = "debug", skip(self, entity), fields(entity = E::NAME))]
    fn delete_permanently<E: Entity>(&self, entity: &E) -> Result<u64> {
        let def = self.context().registry().lookup_type::<E>()?;
        let mut record = entity.to_record();
        self.run(Access::Write, |engine| {
            engine.delete_record(&def, &mut record, true)
        })
    }

    /// Reload `entity` from the database by primary key.
    fn reload<E: Entity>(&self, entity: &mut E) -> Result<()> {
        let def = self.context().registry().lookup_type::<E>()?;
        let predicate = key_predicate(&def, &entity.to_record(), self.context().dialect())?;
        let fresh = self
            .model::<E>()
            .unscoped()
            .filter((predicate.sql, predicate.params))
            .take()?;
        entity.apply_record(&fresh.to_record())
    }

    // ==================== Associations ====================

    /// The `relation` of `owner`.
    fn association<E: Entity>(&self, owner: &E, relation: &str) -> Result<Association<'_, Self>> {
        let resolved = self.context().registry().relation(E::NAME, relation)?;
        Association::new(self, resolved, owner.to_record())
    }

    /// Join rows of the many-to-many `relation` of `E`.
    fn join_table<E: Entity>(&self, relation: &str) -> Result<JoinTable<'_, Self>> {
        let resolved = self.context().registry().relation(E::NAME, relation)?;
        let spec = resolved.join.ok_or_else(|| {
            Error::Query(format!(
                "`{}.{}` is not a many-to-many relation",
                E::NAME,
                relation
            ))
        })?;
        JoinTable::new(self, spec)
    }
}
