//! Association mode and join-table handles.
//!
//! [`Association`] works on the relation of one owner instance:
//!
//! | operation | many-to-many        | has-one / has-many          | belongs-to             |
//! |-----------|---------------------|-----------------------------|------------------------|
//! | `append`  | upsert + join rows  | upsert with FK = owner key  | upsert, set owner FK   |
//! | `replace` | append, unlink rest | append, NULL FK of the rest | append                 |
//! | `delete`  | remove join rows    | NULL FK of the given ones   | NULL owner FK          |
//! | `clear`   | remove all join rows| NULL FK of all              | NULL owner FK          |
//!
//! Nulling a foreign key declared `NOT NULL` surfaces as a constraint
//! violation; nothing is deleted implicitly.
//!
//! The association works on a copy of the owner. Belongs-to writes change the
//! owner's foreign key in the database and in that copy only; use
//! [`Association::apply_to_owner`] to bring the caller's value up to date.

use relmodel_core::{
    Entity, Error, Record, RelationshipKind, Result, Value, validate_identifier,
};
use relmodel_query::{
    Condition, DeleteBuilder, Fragment, Select, Statement, UpdateBuilder, WhereClause,
};
use relmodel_schema::{JoinSpec, ResolvedRelation};

use crate::engine::{Access, Engine};
use crate::executor::Executor;
use crate::mapping::{key_predicate, single_key};
use crate::persist::{CreateOptions, OnConflict};

/// The relation of one owner instance.
#[derive(Debug)]
pub struct Association<'x, X> {
    exec: &'x X,
    relation: ResolvedRelation,
    owner: Record,
    filter: WhereClause,
    unscoped: bool,
}

impl<'x, X: Executor> Association<'x, X> {
    pub(crate) fn new(exec: &'x X, relation: ResolvedRelation, owner: Record) -> Result<Self> {
        if relation.source.has_zero_key(&owner) {
            return Err(Error::Query(format!(
                "association `{}.{}` needs an owner with a primary key",
                relation.source.name, relation.name
            )));
        }
        Ok(Self {
            exec,
            relation,
            owner,
            filter: WhereClause::new(),
            unscoped: false,
        })
    }

    /// The resolved relation.
    pub fn relation(&self) -> &ResolvedRelation {
        &self.relation
    }

    /// Restrict `find`/`count` by a condition on the target table.
    pub fn filter(mut self, condition: impl Into<Condition>) -> Self {
        let dialect = self.exec.context().dialect();
        if let Some(fragment) = condition
            .into()
            .translate(dialect, Some(self.relation.target.table))
        {
            self.filter.and(fragment);
        }
        self
    }

    /// Include soft-deleted targets in `find`/`count`.
    pub fn unscoped(mut self) -> Self {
        self.unscoped = true;
        self
    }

    /// Write the owner's foreign key, as changed by belongs-to `append`,
    /// `replace`, `delete` or `clear`, back onto `owner`.
    pub fn apply_to_owner<E: Entity>(&self, owner: &mut E) -> Result<()> {
        if E::NAME != self.relation.source.name {
            return Err(Error::Query(format!(
                "association `{}.{}` is owned by `{}`, not `{}`",
                self.relation.source.name,
                self.relation.name,
                self.relation.source.name,
                E::NAME
            )));
        }
        let mut key = Record::new();
        key.set(self.relation.source_key.clone(), self.owner_key());
        owner.apply_record(&key)
    }

    fn owner_key(&self) -> Value {
        self.owner.get_or_null(&self.relation.source_key)
    }

    fn select(&self, engine: &Engine<'_>) -> Option<Select> {
        let dialect = engine.dialect();
        let owner_key = self.owner_key();
        if owner_key.is_null() {
            return None;
        }
        let target = &self.relation.target;
        let mut select = Select::new(target.table).filter_clause(self.filter.clone());
        let predicate = match &self.relation.join {
            None => format!("{} = ?", dialect.qualified(target.table, &self.relation.target_key)),
            Some(join) => {
                select = select.join(Fragment::new(
                    format!(
                        "INNER JOIN {} ON {} = {}",
                        dialect.quote_ident(&join.table),
                        dialect.qualified(&join.table, &join.target_column),
                        dialect.qualified(target.table, &self.relation.target_key)
                    ),
                    Vec::new(),
                ));
                format!("{} = ?", dialect.qualified(&join.table, &join.source_column))
            }
        };
        select = select.guard(Fragment::new(predicate, vec![owner_key]));
        if let Some(guard) = relmodel_query::scope_guard(target, dialect, None, self.unscoped) {
            select = select.guard(guard);
        }
        for column in target.primary_key_columns() {
            select = select.order_by(dialect.qualified(target.table, column));
        }
        Some(select)
    }

    /// Related records.
    #[track_caller]
    pub fn find_records(&self) -> Result<Vec<Record>> {
        self.exec
            .context()
            .tracker()
            .record_load(self.relation.source.name, self.relation.name);
        self.exec.run(Access::Read, |engine| {
            let Some(select) = self.select(engine) else {
                return Ok(Vec::new());
            };
            let rows = engine.query(&select.build(engine.dialect()))?;
            Ok(rows.into_iter().map(Record::from_row).collect())
        })
    }

    /// Related entities.
    #[track_caller]
    pub fn find<T: Entity>(&self) -> Result<Vec<T>> {
        self.check_target::<T>()?;
        self.find_records()?.iter().map(T::from_record).collect()
    }

    /// Number of related rows.
    pub fn count(&self) -> Result<u64> {
        self.exec.run(Access::Read, |engine| {
            let Some(select) = self.select(engine) else {
                return Ok(0);
            };
            let rows = engine.query(&select.build_count(engine.dialect()))?;
            Ok(rows
                .first()
                .and_then(|r| r.get_index(0))
                .and_then(Value::as_i64)
                .unwrap_or(0) as u64)
        })
    }

    fn check_target<T: Entity>(&self) -> Result<()> {
        if T::NAME == self.relation.target.name {
            Ok(())
        } else {
            Err(Error::Query(format!(
                "association `{}.{}` targets `{}`, not `{}`",
                self.relation.source.name,
                self.relation.name,
                self.relation.target.name,
                T::NAME
            )))
        }
    }

    /// Link `targets` to the owner, creating the ones that do not exist.
    /// Generated keys are written back onto `targets`.
    pub fn append<T: Entity>(&mut self, targets: &mut [T]) -> Result<()> {
        self.check_target::<T>()?;
        let mut records: Vec<Record> = targets.iter().map(Entity::to_record).collect();
        let replace_single = self.relation.kind == RelationshipKind::HasOne;
        let relation = &self.relation;
        let owner = &mut self.owner;
        self.exec.run(Access::Write, |engine| {
            link_targets(engine, relation, owner, &mut records)?;
            if replace_single {
                unlink_others(engine, relation, owner, &records)?;
            }
            Ok(())
        })?;
        for (target, record) in targets.iter_mut().zip(&records) {
            target.apply_record(record)?;
        }
        Ok(())
    }

    /// Make `targets` the complete set of related rows.
    pub fn replace<T: Entity>(&mut self, targets: &mut [T]) -> Result<()> {
        self.check_target::<T>()?;
        let mut records: Vec<Record> = targets.iter().map(Entity::to_record).collect();
        let relation = &self.relation;
        let owner = &mut self.owner;
        self.exec.run(Access::Write, |engine| {
            link_targets(engine, relation, owner, &mut records)?;
            if relation.kind != RelationshipKind::BelongsTo {
                unlink_others(engine, relation, owner, &records)?;
            }
            Ok(())
        })?;
        for (target, record) in targets.iter_mut().zip(&records) {
            target.apply_record(record)?;
        }
        Ok(())
    }

    /// Unlink `targets` from the owner. Returns the number of links removed.
    pub fn delete<T: Entity>(&mut self, targets: &[T]) -> Result<u64> {
        self.check_target::<T>()?;
        let records: Vec<Record> = targets.iter().map(Entity::to_record).collect();
        let relation = &self.relation;
        let owner = &mut self.owner;
        self.exec.run(Access::Write, |engine| {
            unlink(engine, relation, owner, Some(records.as_slice()))
        })
    }

    /// Unlink every target from the owner.
    pub fn clear(&mut self) -> Result<u64> {
        let relation = &self.relation;
        let owner = &mut self.owner;
        self.exec
            .run(Access::Write, |engine| unlink(engine, relation, owner, None))
    }
}

fn append_options() -> CreateOptions {
    CreateOptions::new().on_conflict(OnConflict::DoNothing)
}

fn link_targets(
    engine: &mut Engine<'_>,
    relation: &ResolvedRelation,
    owner: &mut Record,
    records: &mut [Record],
) -> Result<()> {
    let owner_key = owner.get_or_null(&relation.source_key);
    match relation.kind {
        RelationshipKind::ManyToMany => {
            let join = join_spec(relation)?;
            for record in records.iter_mut() {
                engine.create_record(&relation.target, record, &append_options())?;
                let target_key = record.get_or_null(&relation.target_key);
                engine.link(join, owner_key.clone(), target_key)?;
            }
        }
        RelationshipKind::HasOne | RelationshipKind::HasMany => {
            // Existing children only get their foreign key moved.
            let options = CreateOptions::new()
                .on_conflict(OnConflict::UpdateColumns(vec![relation.target_key.clone()]));
            for record in records.iter_mut() {
                record.set(relation.target_key.clone(), owner_key.clone());
                engine.create_record(&relation.target, record, &options)?;
            }
        }
        RelationshipKind::BelongsTo => {
            let Some(record) = records.last_mut() else {
                return Ok(());
            };
            engine.create_record(&relation.target, record, &append_options())?;
            let key = record.get_or_null(&relation.target_key);
            set_owner_key(engine, relation, owner, key)?;
        }
    }
    Ok(())
}

/// Unlink every target of `owner` whose key is not among `keep`.
fn unlink_others(
    engine: &mut Engine<'_>,
    relation: &ResolvedRelation,
    owner: &Record,
    keep: &[Record],
) -> Result<u64> {
    let dialect = engine.dialect();
    let owner_key = owner.get_or_null(&relation.source_key);
    match &relation.join {
        Some(join) => {
            let kept: Vec<Value> = keep
                .iter()
                .map(|r| r.get_or_null(&relation.target_key))
                .collect();
            let mut filter = WhereClause::new();
            filter.and(Fragment::new(
                format!("{} = ?", dialect.quote_ident(&join.source_column)),
                vec![owner_key],
            ));
            if !kept.is_empty() {
                filter.and_not(Fragment::new(
                    format!("{} IN ?", dialect.quote_ident(&join.target_column)),
                    vec![Value::List(kept)],
                ));
            }
            let stmt = DeleteBuilder::new(join.table.as_str())
                .filter_clause(filter)
                .build(dialect)?;
            engine.execute(&stmt)
        }
        None => {
            let target = &relation.target;
            let key = single_key(target)?;
            let kept: Vec<Value> = keep.iter().map(|r| r.get_or_null(key)).collect();
            let mut filter = WhereClause::new();
            filter.and(Fragment::new(
                format!("{} = ?", dialect.qualified(target.table, &relation.target_key)),
                vec![owner_key],
            ));
            if !kept.is_empty() {
                filter.and_not(Fragment::new(
                    format!("{} IN ?", dialect.qualified(target.table, key)),
                    vec![Value::List(kept)],
                ));
            }
            null_foreign_key(engine, target.table, &relation.target_key, filter)
        }
    }
}

/// Unlink `targets` (or everything when `None`) from `owner`.
fn unlink(
    engine: &mut Engine<'_>,
    relation: &ResolvedRelation,
    owner: &mut Record,
    targets: Option<&[Record]>,
) -> Result<u64> {
    let dialect = engine.dialect();
    let owner_key = owner.get_or_null(&relation.source_key);
    match relation.kind {
        RelationshipKind::ManyToMany => {
            let join = join_spec(relation)?;
            let mut filter = WhereClause::new();
            filter.and(Fragment::new(
                format!("{} = ?", dialect.quote_ident(&join.source_column)),
                vec![owner_key],
            ));
            if let Some(targets) = targets {
                let keys = target_values(targets, &relation.target_key);
                if keys.is_empty() {
                    return Ok(0);
                }
                filter.and(Fragment::new(
                    format!("{} IN ?", dialect.quote_ident(&join.target_column)),
                    vec![Value::List(keys)],
                ));
            }
            let stmt = DeleteBuilder::new(join.table.as_str())
                .filter_clause(filter)
                .build(dialect)?;
            engine.execute(&stmt)
        }
        RelationshipKind::HasOne | RelationshipKind::HasMany => {
            let target = &relation.target;
            let mut filter = WhereClause::new();
            filter.and(Fragment::new(
                format!("{} = ?", dialect.qualified(target.table, &relation.target_key)),
                vec![owner_key],
            ));
            if let Some(targets) = targets {
                let key = single_key(target)?;
                let keys = target_values(targets, key);
                if keys.is_empty() {
                    return Ok(0);
                }
                filter.and(Fragment::new(
                    format!("{} IN ?", dialect.qualified(target.table, key)),
                    vec![Value::List(keys)],
                ));
            }
            null_foreign_key(engine, target.table, &relation.target_key, filter)
        }
        RelationshipKind::BelongsTo => {
            if owner_key.is_null() {
                return Ok(0);
            }
            if let Some(targets) = targets {
                let keys = target_values(targets, &relation.target_key);
                if !keys.iter().any(|k| k.key() == owner_key.key()) {
                    return Ok(0);
                }
            }
            set_owner_key(engine, relation, owner, Value::Null)
        }
    }
}

fn target_values(targets: &[Record], column: &str) -> Vec<Value> {
    targets
        .iter()
        .map(|r| r.get_or_null(column))
        .filter(|v| !v.is_null())
        .collect()
}

fn join_spec(relation: &ResolvedRelation) -> Result<&JoinSpec> {
    relation.join.as_ref().ok_or_else(|| {
        Error::Schema(format!(
            "relation `{}.{}` has no join table",
            relation.source.name, relation.name
        ))
    })
}

fn null_foreign_key(
    engine: &mut Engine<'_>,
    table: &str,
    column: &str,
    filter: WhereClause,
) -> Result<u64> {
    let stmt = UpdateBuilder::new(table)
        .set(column, Value::Null)
        .filter_clause(filter)
        .build(engine.dialect())?;
    engine.execute(&stmt)
}

/// Point the owner's foreign key at `key`, in the database and on `owner`.
fn set_owner_key(
    engine: &mut Engine<'_>,
    relation: &ResolvedRelation,
    owner: &mut Record,
    key: Value,
) -> Result<u64> {
    let source = &relation.source;
    let stmt = UpdateBuilder::new(source.table)
        .set(relation.source_key.as_str(), key.clone())
        .filter(key_predicate(source, owner, engine.dialect())?)
        .build(engine.dialect())?;
    let affected = engine.execute(&stmt)?;
    owner.set(relation.source_key.clone(), key);
    Ok(affected)
}

/// Direct access to the join rows of a many-to-many relation.
#[derive(Debug)]
pub struct JoinTable<'x, X> {
    exec: &'x X,
    spec: JoinSpec,
}

impl<'x, X: Executor> JoinTable<'x, X> {
    pub(crate) fn new(exec: &'x X, spec: JoinSpec) -> Result<Self> {
        validate_identifier(&spec.table)?;
        validate_identifier(&spec.source_column)?;
        validate_identifier(&spec.target_column)?;
        Ok(Self { exec, spec })
    }

    /// Join table name.
    pub fn name(&self) -> &str {
        &self.spec.table
    }

    /// Link `source` and `target`; an existing link is kept.
    pub fn add(&self, source: impl Into<Value>, target: impl Into<Value>) -> Result<u64> {
        let (source, target) = (source.into(), target.into());
        self.exec
            .run(Access::Write, |engine| engine.link(&self.spec, source, target))
    }

    /// Remove the link between `source` and `target`.
    pub fn remove(&self, source: impl Into<Value>, target: impl Into<Value>) -> Result<u64> {
        let (source, target) = (source.into(), target.into());
        self.delete_where(vec![
            (self.spec.source_column.as_str(), source),
            (self.spec.target_column.as_str(), target),
        ])
    }

    /// Remove every link of `source`.
    pub fn clear(&self, source: impl Into<Value>) -> Result<u64> {
        self.delete_where(vec![(self.spec.source_column.as_str(), source.into())])
    }

    fn delete_where(&self, pairs: Vec<(&str, Value)>) -> Result<u64> {
        self.exec.run(Access::Write, |engine| {
            let dialect = engine.dialect();
            let mut filter = WhereClause::new();
            for (column, value) in pairs {
                filter.and(Fragment::new(
                    format!("{} = ?", dialect.quote_ident(column)),
                    vec![value],
                ));
            }
            let stmt = DeleteBuilder::new(self.spec.table.as_str())
                .filter_clause(filter)
                .build(dialect)?;
            engine.execute(&stmt)
        })
    }

    /// Every `(source, target)` link, ordered.
    pub fn pairs(&self) -> Result<Vec<(Value, Value)>> {
        self.exec.run(Access::Read, |engine| {
            let dialect = engine.dialect();
            let source = dialect.quote_ident(&self.spec.source_column);
            let target = dialect.quote_ident(&self.spec.target_column);
            let stmt = Statement::finish(
                Fragment::new(
                    format!(
                        "SELECT {source}, {target} FROM {} ORDER BY {source}, {target}",
                        dialect.quote_ident(&self.spec.table)
                    ),
                    Vec::new(),
                ),
                dialect,
            );
            Ok(engine
                .query(&stmt)?
                .into_iter()
                .map(|row| {
                    (
                        row.get_index(0).cloned().unwrap_or_default(),
                        row.get_index(1).cloned().unwrap_or_default(),
                    )
                })
                .collect())
        })
    }
}
