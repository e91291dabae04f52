//! Query conditions and their translation to SQL.
//!
//! A [`Condition`] is one of three shapes, all resolved by
//! [`Condition::translate`]:
//!
//! - `Raw`: SQL text with `?` placeholders and bound parameters.
//! - `Equality`: a column map; **every entry is included**, even empty
//!   strings, zeros and NULLs (`NULL` renders as `IS NULL`).
//! - `StructEquality`: the column values of an entity instance; **zero values
//!   are skipped**, so an all-zero instance contributes no predicate.
//!
//! The asymmetry is deliberate and observable: `Equality` of
//! `{middle_name: ""}` matches rows with an empty middle name, while a struct
//! with an empty `middle_name` ignores that column altogether.

use relmodel_core::{Entity, Row, Value};

use crate::dialect::Dialect;
use crate::statement::Fragment;

/// A predicate source.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Raw SQL with `?` placeholders.
    Raw {
        /// SQL text.
        sql: String,
        /// Parameters in placeholder order.
        params: Vec<Value>,
    },
    /// Column map; every entry becomes an equality predicate.
    Equality(Row),
    /// Entity column values; zero values are skipped.
    StructEquality(Row),
}

impl Condition {
    /// Raw SQL condition.
    pub fn raw(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Condition::Raw {
            sql: sql.into(),
            params,
        }
    }

    /// Map condition.
    pub fn map(row: Row) -> Self {
        Condition::Equality(row)
    }

    /// Struct condition from an entity instance.
    pub fn entity<E: Entity>(entity: &E) -> Self {
        Condition::StructEquality(entity.to_record().values)
    }

    /// Translate to a SQL fragment.
    ///
    /// Column names of map and struct conditions are quoted and, when `table`
    /// is given, qualified with it. Returns `None` when the condition
    /// contributes no predicate (an empty map or an all-zero struct).
    pub fn translate(&self, dialect: Dialect, table: Option<&str>) -> Option<Fragment> {
        let column = |name: &str| match table {
            Some(t) if !name.contains('.') => dialect.qualified(t, name),
            _ => dialect.quote_ident(name),
        };
        let equalities = |pairs: Vec<(&str, &Value)>| -> Option<Fragment> {
            if pairs.is_empty() {
                return None;
            }
            let mut fragment = Fragment::default();
            for (name, value) in pairs {
                let part = match value {
                    Value::Null => Fragment::new(format!("{} IS NULL", column(name)), Vec::new()),
                    Value::List(_) => {
                        Fragment::new(format!("{} IN ?", column(name)), vec![value.clone()])
                    }
                    _ => Fragment::new(format!("{} = ?", column(name)), vec![value.clone()]),
                };
                fragment.push(" AND ", part);
            }
            Some(fragment)
        };

        match self {
            Condition::Raw { sql, params } => {
                if sql.trim().is_empty() {
                    None
                } else {
                    Some(Fragment::new(sql.clone(), params.clone()))
                }
            }
            Condition::Equality(row) => equalities(row.iter().collect()),
            Condition::StructEquality(row) => {
                equalities(row.iter().filter(|(_, v)| !v.is_zero()).collect())
            }
        }
    }
}

impl From<&str> for Condition {
    fn from(sql: &str) -> Self {
        Condition::raw(sql, Vec::new())
    }
}

impl From<String> for Condition {
    fn from(sql: String) -> Self {
        Condition::raw(sql, Vec::new())
    }
}

impl<S: Into<String>> From<(S, Vec<Value>)> for Condition {
    fn from((sql, params): (S, Vec<Value>)) -> Self {
        Condition::raw(sql, params)
    }
}

impl From<Row> for Condition {
    fn from(row: Row) -> Self {
        Condition::Equality(row)
    }
}

/// Accumulated predicate of a query.
///
/// - `and(c)`: `acc AND (c)`, in call order;
/// - `or(c)`: wraps the accumulated condition, `((acc) OR (c))`;
/// - `and_not(c)`: `acc AND NOT (c)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    fragment: Fragment,
}

impl WhereClause {
    /// Empty clause.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no predicate has been added.
    pub fn is_empty(&self) -> bool {
        self.fragment.is_empty()
    }

    /// AND a predicate.
    pub fn and(&mut self, cond: Fragment) {
        if cond.is_empty() {
            return;
        }
        let wrapped = Fragment::new(format!("({})", cond.sql), cond.params);
        self.fragment.push(" AND ", wrapped);
    }

    /// OR a predicate with everything accumulated so far.
    pub fn or(&mut self, cond: Fragment) {
        if cond.is_empty() {
            return;
        }
        if self.is_empty() {
            self.and(cond);
            return;
        }
        let acc = std::mem::take(&mut self.fragment);
        let mut params = acc.params;
        params.extend(cond.params);
        self.fragment = Fragment::new(format!("(({}) OR ({}))", acc.sql, cond.sql), params);
    }

    /// AND the negation of a predicate.
    pub fn and_not(&mut self, cond: Fragment) {
        if cond.is_empty() {
            return;
        }
        let negated = Fragment::new(format!("NOT ({})", cond.sql), cond.params);
        self.fragment.push(" AND ", negated);
    }

    /// The accumulated fragment.
    pub fn fragment(&self) -> &Fragment {
        &self.fragment
    }

    /// Combine with a filter that must stay outside the user's group:
    /// `(user) AND extra`.
    pub fn with_guard(&self, guard: Option<Fragment>) -> Fragment {
        match (self.is_empty(), guard) {
            (true, None) => Fragment::default(),
            (true, Some(g)) => g,
            (false, None) => self.fragment.clone(),
            (false, Some(g)) => {
                let mut params = self.fragment.params.clone();
                params.extend(g.params);
                Fragment::new(format!("({}) AND {}", self.fragment.sql, g.sql), params)
            }
        }
    }
}
