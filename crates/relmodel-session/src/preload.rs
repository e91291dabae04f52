//! Batched relation loading.
//!
//! Each requested relation costs one query per level (more only when the
//! parent keys exceed [`PRELOAD_CHUNK`]): the parent keys are collected,
//! the targets fetched with `IN (...)` and zippered back onto their parents
//! by key. A nested path such as `user.addresses` loads `user` first and then
//! `addresses` for all loaded users at once.

use std::collections::HashMap;

use relmodel_core::{EntityDef, Record, Result, Value, ValueKey};
use relmodel_query::{Condition, Fragment, Select};
use relmodel_schema::ResolvedRelation;

use crate::engine::Engine;
use crate::mapping::distinct_values;

/// Maximum number of keys bound in one `IN (...)`.
pub const PRELOAD_CHUNK: usize = 900;

/// Column the join-table key is projected under for many-to-many loads.
const JOIN_KEY_ALIAS: &str = "__relmodel_join_key";

/// A requested preload.
#[derive(Debug, Clone)]
pub struct PreloadRequest {
    /// Relation names from the root (`["user", "addresses"]`).
    pub path: Vec<String>,
    /// Extra condition on the last relation of the path.
    pub condition: Option<Condition>,
}

impl PreloadRequest {
    /// Parse a dotted path.
    pub fn new(path: &str, condition: Option<Condition>) -> Self {
        Self {
            path: path.split('.').map(str::to_string).collect(),
            condition,
        }
    }
}

impl Engine<'_> {
    /// Apply preload requests to freshly loaded root records.
    pub(crate) fn preload(
        &mut self,
        def: &EntityDef,
        records: &mut [Record],
        requests: &[PreloadRequest],
        all: bool,
        unscoped: bool,
    ) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        if all {
            for info in &def.relationships {
                let relation = self.registry().relation(def.name, info.name)?;
                self.load_relation(&relation, records, None, unscoped)?;
            }
        }
        let mut ordered: Vec<&PreloadRequest> = requests.iter().collect();
        ordered.sort_by_key(|r| r.path.len());
        for request in ordered {
            self.preload_path(def, records, &request.path, request.condition.as_ref(), unscoped)?;
        }
        Ok(())
    }

    fn preload_path(
        &mut self,
        def: &EntityDef,
        records: &mut [Record],
        path: &[String],
        condition: Option<&Condition>,
        unscoped: bool,
    ) -> Result<()> {
        let Some((head, rest)) = path.split_first() else {
            return Ok(());
        };
        let relation = self.registry().relation(def.name, head)?;
        let loaded = records.iter().all(|r| r.relation(relation.name).is_some());
        let last = rest.is_empty();
        if !loaded || (last && condition.is_some()) {
            self.load_relation(&relation, records, condition.filter(|_| last), unscoped)?;
        }
        if last {
            return Ok(());
        }

        let mut sizes = Vec::with_capacity(records.len());
        let mut children = Vec::new();
        for record in records.iter_mut() {
            let taken = record.take_relation(relation.name).unwrap_or_default();
            sizes.push(taken.len());
            children.extend(taken);
        }
        let outcome = self.preload_path(&relation.target, &mut children, rest, condition, unscoped);
        let mut children = children.into_iter();
        for (record, size) in records.iter_mut().zip(sizes) {
            record.set_relation(relation.name, children.by_ref().take(size).collect());
        }
        outcome
    }

    /// Load one relation for every record in one query per key chunk.
    pub(crate) fn load_relation(
        &mut self,
        relation: &ResolvedRelation,
        records: &mut [Record],
        condition: Option<&Condition>,
        unscoped: bool,
    ) -> Result<()> {
        let dialect = self.dialect();
        let target = &relation.target;
        let keys = distinct_values(records.iter(), &relation.source_key);
        let mut found: HashMap<ValueKey, Vec<Record>> = HashMap::new();

        for chunk in keys.chunks(PRELOAD_CHUNK) {
            let list = Value::List(chunk.to_vec());
            let mut select = Select::new(target.table);
            select = match &relation.join {
                None => select.filter(Fragment::new(
                    format!("{} IN ?", dialect.qualified(target.table, &relation.target_key)),
                    vec![list],
                )),
                Some(join) => select
                    .columns([
                        format!("{}.*", dialect.quote_ident(target.table)),
                        format!(
                            "{} AS {}",
                            dialect.qualified(&join.table, &join.source_column),
                            dialect.quote_ident(JOIN_KEY_ALIAS)
                        ),
                    ])
                    .join(Fragment::new(
                        format!(
                            "INNER JOIN {} ON {} = {}",
                            dialect.quote_ident(&join.table),
                            dialect.qualified(&join.table, &join.target_column),
                            dialect.qualified(target.table, &relation.target_key)
                        ),
                        Vec::new(),
                    ))
                    .filter(Fragment::new(
                        format!("{} IN ?", dialect.qualified(&join.table, &join.source_column)),
                        vec![list],
                    )),
            };
            if let Some(fragment) = condition.and_then(|c| c.translate(dialect, Some(target.table))) {
                select = select.filter(fragment);
            }
            if let Some(guard) = relmodel_query::scope_guard(target, dialect, None, unscoped) {
                select = select.guard(guard);
            }
            for column in target.primary_key_columns() {
                select = select.order_by(dialect.qualified(target.table, column));
            }

            for mut row in self.query(&select.build(dialect))? {
                let key = match relation.join {
                    Some(_) => row.remove(JOIN_KEY_ALIAS),
                    None => row.get(&relation.target_key).cloned(),
                };
                if let Some(key) = key.filter(|k| !k.is_null()) {
                    found.entry(key.key()).or_default().push(Record::from_row(row));
                }
            }
        }

        let mut attached = 0usize;
        for record in records.iter_mut() {
            let mut related = record
                .get(&relation.source_key)
                .filter(|k| !k.is_null())
                .and_then(|k| found.get(&k.key()))
                .cloned()
                .unwrap_or_default();
            if relation.is_single() {
                related.truncate(1);
            }
            attached += related.len();
            record.set_relation(relation.name, related);
        }
        tracing::debug!(
            entity = relation.source.name,
            relation = relation.name,
            parents = records.len(),
            keys = keys.len(),
            attached,
            "Preloaded relation"
        );
        Ok(())
    }
}
