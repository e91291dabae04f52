//! The query builder returned by [`Executor::model`](crate::Executor::model).
//!
//! Builder methods only accumulate state; nothing runs until a terminal
//! (`find`, `first`, `count`, `update`, `delete`, ...) is called.
//!
//! # Example
//!
//! ```ignore
//! let users: Vec<User> = db
//!     .model::<User>()
//!     .filter(("first_name = ?", params!["Eko"]))
//!     .or(row! { "last_name" => "Kurniawan" })
//!     .joins("wallet")
//!     .preload("addresses")
//!     .order("id desc")
//!     .limit(10)
//!     .find()?;
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use relmodel_core::{Entity, EntityDef, Error, FromRecord, Record, Result, Row, Value};
use relmodel_query::{Condition, Fragment, LockStrength, Select, WhereClause};

use crate::engine::{Access, Engine};
use crate::executor::Executor;
use crate::mapping::{JoinPlan, key_predicate, plan_join, split_joined};
use crate::preload::PreloadRequest;

#[derive(Debug, Clone)]
enum JoinRequest {
    Relation(String),
    Raw(Fragment),
}

/// A lazily built query over entity `E`.
#[derive(Debug)]
pub struct Query<'x, X, E> {
    exec: &'x X,
    def: Option<Arc<EntityDef>>,
    filter: WhereClause,
    columns: Vec<String>,
    distinct: bool,
    order: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    joins: Vec<JoinRequest>,
    preloads: Vec<PreloadRequest>,
    preload_all: bool,
    group: Vec<String>,
    having: WhereClause,
    unscoped: bool,
    lock: Option<LockStrength>,
    allow_global: bool,
    _entity: PhantomData<fn() -> E>,
}

impl<'x, X: Executor, E: Entity> Query<'x, X, E> {
    pub(crate) fn new(exec: &'x X) -> Self {
        let def = exec.context().registry().lookup_type::<E>().ok();
        Self {
            exec,
            def,
            filter: WhereClause::new(),
            columns: Vec::new(),
            distinct: false,
            order: Vec::new(),
            limit: None,
            offset: None,
            joins: Vec::new(),
            preloads: Vec::new(),
            preload_all: false,
            group: Vec::new(),
            having: WhereClause::new(),
            unscoped: false,
            lock: None,
            allow_global: false,
            _entity: PhantomData,
        }
    }

    fn table(&self) -> Option<&'static str> {
        self.def.as_ref().map(|d| d.table)
    }

    fn translate(&self, condition: impl Into<Condition>) -> Option<Fragment> {
        condition
            .into()
            .translate(self.exec.context().dialect(), self.table())
    }

    // ==================== Conditions ====================

    /// AND a condition: raw SQL (`("age > ?", params![18])`), a column map
    /// (`row! {..}`, every entry compared) or `Condition::entity(&e)` (zero
    /// fields ignored).
    pub fn filter(mut self, condition: impl Into<Condition>) -> Self {
        if let Some(fragment) = self.translate(condition) {
            self.filter.and(fragment);
        }
        self
    }

    /// OR a condition with everything accumulated so far.
    pub fn or(mut self, condition: impl Into<Condition>) -> Self {
        if let Some(fragment) = self.translate(condition) {
            self.filter.or(fragment);
        }
        self
    }

    /// AND the negation of a condition.
    pub fn not(mut self, condition: impl Into<Condition>) -> Self {
        if let Some(fragment) = self.translate(condition) {
            self.filter.and_not(fragment);
        }
        self
    }

    // ==================== Shape ====================

    /// Select explicit columns or expressions instead of the entity's columns.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// `SELECT DISTINCT`.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Append an ORDER BY expression (`"age desc"`).
    pub fn order(mut self, expr: impl Into<String>) -> Self {
        self.order.push(expr.into());
        self
    }

    /// Limit the number of rows.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Skip rows.
    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Eager-join a single-valued relation (`"wallet"`, nested `"user.wallet"`).
    ///
    /// The relation is joined under its path alias, so conditions can
    /// reference it: `.joins("wallet").filter(("wallet.balance > ?", params![100]))`.
    pub fn joins(mut self, relation: &str) -> Self {
        self.joins.push(JoinRequest::Relation(relation.to_string()));
        self
    }

    /// Append a hand-written join clause.
    pub fn join_raw(mut self, sql: impl Into<String>, params: Vec<Value>) -> Self {
        self.joins.push(JoinRequest::Raw(Fragment::new(sql, params)));
        self
    }

    /// Load a relation (dotted paths load nested levels).
    pub fn preload(mut self, path: &str) -> Self {
        self.preloads.push(PreloadRequest::new(path, None));
        self
    }

    /// Load a relation, restricting the last level by `condition`.
    pub fn preload_with(mut self, path: &str, condition: impl Into<Condition>) -> Self {
        self.preloads
            .push(PreloadRequest::new(path, Some(condition.into())));
        self
    }

    /// Load every direct relation.
    pub fn preload_all(mut self) -> Self {
        self.preload_all = true;
        self
    }

    /// Append a GROUP BY expression.
    pub fn group(mut self, expr: impl Into<String>) -> Self {
        self.group.push(expr.into());
        self
    }

    /// AND a HAVING condition.
    pub fn having(mut self, condition: impl Into<Condition>) -> Self {
        if let Some(fragment) = self.translate(condition) {
            self.having.and(fragment);
        }
        self
    }

    /// Apply a reusable query fragment.
    ///
    /// ```ignore
    /// fn rich<'x, X: Executor>(q: Query<'x, X, Wallet>) -> Query<'x, X, Wallet> {
    ///     q.filter(("balance > ?", params![1000]))
    /// }
    /// db.model::<Wallet>().scopes(rich).find()?;
    /// ```
    pub fn scopes(self, scope: impl FnOnce(Self) -> Self) -> Self {
        scope(self)
    }

    /// Include soft-deleted rows.
    pub fn unscoped(mut self) -> Self {
        self.unscoped = true;
        self
    }

    /// Lock the selected rows (only meaningful inside a transaction).
    pub fn lock(mut self, strength: LockStrength) -> Self {
        self.lock = Some(strength);
        self
    }

    /// Allow `update`/`delete` without any condition.
    pub fn allow_global(mut self) -> Self {
        self.allow_global = true;
        self
    }

    // ==================== Reads ====================

    fn definition(&self) -> Result<Arc<EntityDef>> {
        self.def
            .clone()
            .ok_or_else(|| Error::UnknownEntity(E::NAME.to_string()))
    }

    fn build_select(&self, engine: &Engine<'_>, def: &EntityDef) -> Result<(Select, Vec<JoinPlan>)> {
        let dialect = engine.dialect();
        let mut select = Select::new(def.table)
            .filter_clause(self.filter.clone())
            .having_clause(self.having.clone())
            .distinct(self.distinct);

        let mut plans: Vec<JoinPlan> = Vec::new();
        for request in &self.joins {
            match request {
                JoinRequest::Relation(path) => {
                    let before = plans.len();
                    plan_join(engine.registry(), def, path, &mut plans)?;
                    for plan in &plans[before..] {
                        select = select.join(plan.join_fragment(dialect, self.unscoped));
                    }
                }
                JoinRequest::Raw(fragment) => select = select.join(fragment.clone()),
            }
        }

        if !self.columns.is_empty() {
            select = select.columns(self.columns.iter().cloned());
        } else if !plans.is_empty() {
            let mut projection = vec![format!("{}.*", dialect.quote_ident(def.table))];
            for plan in &plans {
                projection.extend(plan.projection(dialect));
            }
            select = select.columns(projection);
        }

        if let Some(guard) = relmodel_query::scope_guard(def, dialect, None, self.unscoped) {
            select = select.guard(guard);
        }
        for expr in &self.group {
            select = select.group_by(expr.clone());
        }
        for expr in &self.order {
            select = select.order_by(expr.clone());
        }
        if let Some(n) = self.limit {
            select = select.limit(n);
        }
        if let Some(n) = self.offset {
            select = select.offset(n);
        }
        if let Some(strength) = self.lock {
            select = select.lock(strength);
        }
        Ok((select, plans))
    }

    fn load(&self, engine: &mut Engine<'_>, def: &EntityDef) -> Result<Vec<Record>> {
        if self.lock.is_some() && !engine.in_transaction() {
            tracing::warn!(
                entity = def.name,
                "Row lock requested outside a transaction has no effect"
            );
        }
        let (select, plans) = self.build_select(engine, def)?;
        let rows = engine.query(&select.build(engine.dialect()))?;
        let mut records: Vec<Record> = rows
            .into_iter()
            .map(|row| split_joined(row, &plans))
            .collect();
        engine.preload(def, &mut records, &self.preloads, self.preload_all, self.unscoped)?;
        Ok(records)
    }

    /// All matching records, relations attached.
    pub fn find_records(self) -> Result<Vec<Record>> {
        let def = self.definition()?;
        self.exec.run(Access::Read, |engine| self.load(engine, &def))
    }

    /// All matching entities.
    pub fn find(self) -> Result<Vec<E>> {
        self.find_records()?.iter().map(E::from_record).collect()
    }

    /// All matching rows mapped into `T`, for projections that are not `E`.
    pub fn find_as<T: FromRecord>(self) -> Result<Vec<T>> {
        self.find_records()?.iter().map(T::from_record).collect()
    }

    /// Matching rows as returned by the driver (joined aliases untouched).
    pub fn rows(self) -> Result<Vec<Row>> {
        let def = self.definition()?;
        self.exec.run(Access::Read, |engine| {
            let (select, _) = self.build_select(engine, &def)?;
            engine.query(&select.build(engine.dialect()))
        })
    }

    fn one(mut self, key_order: Option<&str>) -> Result<Record> {
        let def = self.definition()?;
        if let Some(direction) = key_order {
            let dialect = self.exec.context().dialect();
            for column in def.primary_key_columns() {
                self.order
                    .push(format!("{} {}", dialect.qualified(def.table, column), direction));
            }
        }
        self.limit = Some(1);
        self.find_records()?.into_iter().next().ok_or(Error::NotFound)
    }

    /// First match by primary key; `NotFound` when nothing matches.
    pub fn first(self) -> Result<E> {
        E::from_record(&self.one(Some("ASC"))?)
    }

    /// Last match by primary key; `NotFound` when nothing matches.
    pub fn last(self) -> Result<E> {
        E::from_record(&self.one(Some("DESC"))?)
    }

    /// Any one match, in no particular order; `NotFound` when nothing matches.
    pub fn take(self) -> Result<E> {
        E::from_record(&self.one(None)?)
    }

    /// One row mapped into `T` (aggregates, projections).
    pub fn take_as<T: FromRecord>(self) -> Result<T> {
        T::from_record(&self.one(None)?)
    }

    /// Number of matching rows (groups, when grouped).
    pub fn count(self) -> Result<u64> {
        let def = self.definition()?;
        self.exec.run(Access::Read, |engine| {
            let (select, _) = self.build_select(engine, &def)?;
            let rows = engine.query(&select.build_count(engine.dialect()))?;
            rows.first()
                .and_then(|row| row.get_index(0))
                .and_then(Value::as_i64)
                .map(|n| n as u64)
                .ok_or_else(|| Error::mapping("COUNT(*) returned no value"))
        })
    }

    // ==================== Writes ====================

    /// Set one column on every matching row.
    pub fn update(self, column: &str, value: impl Into<Value>) -> Result<u64> {
        let mut sets = Row::new();
        sets.set(column, value);
        self.updates(sets)
    }

    /// Set the mapped columns on every matching row. Every entry is written,
    /// zero values included.
    pub fn updates(self, sets: Row) -> Result<u64> {
        let def = self.definition()?;
        self.exec.run(Access::Write, |engine| {
            engine.update_rows(&def, self.filter.clone(), sets, self.allow_global, self.unscoped)
        })
    }

    /// Set the non-zero columns of `entity` on every matching row. A non-zero
    /// primary key on `entity` restricts the update to that row.
    pub fn updates_from(mut self, entity: &E) -> Result<u64> {
        let def = self.definition()?;
        let record = entity.to_record();
        if !def.has_zero_key(&record) {
            let key = key_predicate(&def, &record, self.exec.context().dialect())?;
            self.filter.and(key);
        }
        let keys = def.primary_key_columns();
        let sets: Row = record
            .values
            .into_pairs()
            .into_iter()
            .filter(|(column, value)| !value.is_zero() && !keys.iter().any(|k| k == column))
            .filter(|(column, _)| def.field_by_column(column).is_some_and(|f| f.updatable()))
            .collect();
        self.updates(sets)
    }

    /// Delete every matching row; soft when the entity has a marker.
    pub fn delete(self) -> Result<u64> {
        self.remove(false)
    }

    /// Physically delete every matching row, marker or not.
    pub fn delete_permanently(self) -> Result<u64> {
        self.remove(true)
    }

    fn remove(self, permanent: bool) -> Result<u64> {
        let def = self.definition()?;
        self.exec.run(Access::Write, |engine| {
            engine.delete_rows(
                &def,
                self.filter.clone(),
                self.allow_global,
                permanent,
                self.unscoped,
            )
        })
    }
}
