//! Row to record mapping for eager joins, and primary-key predicates.
//!
//! A joined relation is selected under the alias of its path (`wallet`,
//! `user__wallet` for `user.wallet`) and its columns are projected as
//! `<alias>__<column>`. Mapping a row splits those columns back out into
//! nested relation records.

use relmodel_core::{EntityDef, Error, Record, Result, Row, Value};
use relmodel_query::{Dialect, Fragment};
use relmodel_schema::{Registry, ResolvedRelation};

/// Separator between path segments and columns in aliases.
pub const ALIAS_SEPARATOR: &str = "__";

/// One eager-joined relation of a query.
#[derive(Debug, Clone)]
pub struct JoinPlan {
    /// Relation names from the root (`["user", "wallet"]`).
    pub path: Vec<&'static str>,
    /// Table alias and column prefix (`user__wallet`).
    pub alias: String,
    /// Alias of the table the relation hangs off (root table name for depth 1).
    pub parent: String,
    /// The resolved relation.
    pub relation: ResolvedRelation,
}

impl JoinPlan {
    /// `LEFT JOIN "<target>" AS "<alias>" ON "<alias>"."<target_key>" = "<parent>"."<source_key>"`,
    /// plus the target's soft-delete guard unless unscoped.
    pub fn join_fragment(&self, dialect: Dialect, unscoped: bool) -> Fragment {
        let target = &self.relation.target;
        let mut sql = format!(
            "LEFT JOIN {} AS {} ON {} = {}",
            dialect.quote_ident(target.table),
            dialect.quote_ident(&self.alias),
            dialect.qualified(&self.alias, &self.relation.target_key),
            dialect.qualified(&self.parent, &self.relation.source_key),
        );
        if let Some(guard) =
            relmodel_query::scope_guard(target, dialect, Some(&self.alias), unscoped)
        {
            sql.push_str(" AND ");
            sql.push_str(&guard.sql);
        }
        Fragment::new(sql, Vec::new())
    }

    /// `"<alias>"."<column>" AS "<alias>__<column>"` for every target column.
    pub fn projection(&self, dialect: Dialect) -> Vec<String> {
        self.relation
            .target
            .column_names()
            .into_iter()
            .map(|column| {
                format!(
                    "{} AS {}",
                    dialect.qualified(&self.alias, column),
                    dialect.quote_ident(&format!("{}{}{}", self.alias, ALIAS_SEPARATOR, column))
                )
            })
            .collect()
    }
}

/// Resolve a dotted join path into plans, one per segment not yet planned.
///
/// Only single-valued relations can be joined; collections must be preloaded.
pub fn plan_join(
    registry: &Registry,
    root: &EntityDef,
    path: &str,
    plans: &mut Vec<JoinPlan>,
) -> Result<()> {
    let mut entity = root.name;
    let mut parent = root.table.to_string();
    let mut segments: Vec<&'static str> = Vec::new();
    for segment in path.split('.') {
        let relation = registry.relation(entity, segment)?;
        if !relation.is_single() {
            return Err(Error::Query(format!(
                "cannot join `{}.{}`: {} relations must be preloaded",
                entity,
                segment,
                relation.kind.as_str()
            )));
        }
        segments.push(relation.name);
        let alias = segments.join(ALIAS_SEPARATOR);
        entity = relation.target.name;
        if !plans.iter().any(|p| p.alias == alias) {
            plans.push(JoinPlan {
                path: segments.clone(),
                alias: alias.clone(),
                parent: parent.clone(),
                relation,
            });
        }
        parent = alias;
    }
    Ok(())
}

/// Split a joined row into a root record with nested relation records.
///
/// A joined relation whose primary-key columns are all NULL (no match for the
/// LEFT JOIN) is not attached.
pub fn split_joined(row: Row, plans: &[JoinPlan]) -> Record {
    if plans.is_empty() {
        return Record::from_row(row);
    }
    // Longest alias first so `user__wallet__id` is not taken for `user`.
    let mut by_length: Vec<(usize, &JoinPlan)> = plans.iter().enumerate().collect();
    by_length.sort_by(|a, b| b.1.alias.len().cmp(&a.1.alias.len()));

    let mut root = Row::new();
    let mut joined: Vec<Row> = vec![Row::new(); plans.len()];
    for (column, value) in row.into_pairs() {
        let owner = by_length.iter().find_map(|(i, plan)| {
            column
                .strip_prefix(plan.alias.as_str())
                .and_then(|rest| rest.strip_prefix(ALIAS_SEPARATOR))
                .map(|rest| (*i, rest.to_string()))
        });
        match owner {
            Some((i, name)) => joined[i].set(name, value),
            None => root.set(column, value),
        }
    }

    let mut record = Record::from_row(root);
    for (plan, values) in plans.iter().zip(joined) {
        let keys = plan.relation.target.primary_key_columns();
        let matched = if keys.is_empty() {
            values.values().iter().any(|v| !v.is_null())
        } else {
            keys.iter()
                .any(|k| values.get(k).is_some_and(|v| !v.is_null()))
        };
        if !matched {
            continue;
        }
        if let Some(parent) = descend(&mut record, &plan.path[..plan.path.len() - 1]) {
            parent.set_relation(plan.relation.name, vec![Record::from_row(values)]);
        }
    }
    record
}

fn descend<'r>(record: &'r mut Record, path: &[&str]) -> Option<&'r mut Record> {
    match path.split_first() {
        None => Some(record),
        Some((head, rest)) => {
            let child = record.relation_mut(head)?.first_mut()?;
            descend(child, rest)
        }
    }
}

/// `"<reference>"."<pk>" = ?` for every primary-key column of `def`.
pub fn key_predicate(def: &EntityDef, record: &Record, dialect: Dialect) -> Result<Fragment> {
    let columns = def.primary_key_columns();
    if columns.is_empty() {
        return Err(Error::Query(format!(
            "entity `{}` has no primary key",
            def.name
        )));
    }
    let mut fragment = Fragment::default();
    for column in columns {
        let value = record.get_or_null(column);
        if value.is_zero() {
            return Err(Error::MissingWhereClause("primary key"));
        }
        fragment.push(
            " AND ",
            Fragment::new(
                format!("{} = ?", dialect.qualified(def.table, column)),
                vec![value],
            ),
        );
    }
    Ok(fragment)
}

/// The single primary-key column of `def`.
pub fn single_key(def: &EntityDef) -> Result<&'static str> {
    match def.primary_key_columns().as_slice() {
        [column] => Ok(*column),
        _ => Err(Error::Query(format!(
            "entity `{}` needs a single-column primary key here",
            def.name
        ))),
    }
}

/// Distinct non-null values of `column` across `records`, in first-seen order.
pub fn distinct_values<'a>(
    records: impl IntoIterator<Item = &'a Record>,
    column: &str,
) -> Vec<Value> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for record in records {
        if let Some(value) = record.get(column).filter(|v| !v.is_null()) {
            if seen.insert(value.key()) {
                out.push(value.clone());
            }
        }
    }
    out
}
