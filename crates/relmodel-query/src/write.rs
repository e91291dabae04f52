//! Query builders for INSERT, UPDATE and DELETE.
//!
//! This module provides builders for the write side of the mapper with
//! support for:
//! - Multi-row inserts
//! - UPSERT (`ON CONFLICT` / `INSERT IGNORE` / `ON DUPLICATE KEY UPDATE`)
//! - Explicit SET lists, including SQL expressions
//! - Refusal of predicate-less updates and deletes

use relmodel_core::{Error, Result, Value};

use crate::condition::WhereClause;
use crate::dialect::Dialect;
use crate::statement::{Fragment, Statement};

/// Conflict resolution strategy for INSERT operations.
#[derive(Debug, Clone, PartialEq)]
pub enum OnConflict {
    /// Do nothing on conflict.
    DoNothing,
    /// Update the given columns of the conflicting row.
    DoUpdate {
        /// The columns to update. If empty, every inserted column outside the
        /// target is updated.
        columns: Vec<String>,
        /// The conflict target (column names).
        target: Vec<String>,
    },
}

/// INSERT query builder.
///
/// # Example
///
/// ```
/// use relmodel_query::{Dialect, InsertBuilder};
///
/// let stmt = InsertBuilder::new("users")
///     .columns(["id", "name"])
///     .row(vec!["1".into(), "Eko".into()])
///     .on_conflict_do_nothing()
///     .build(Dialect::Sqlite)
///     .unwrap();
/// assert_eq!(
///     stmt.sql,
///     "INSERT INTO \"users\" (\"id\", \"name\") VALUES (?1, ?2) ON CONFLICT DO NOTHING"
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct InsertBuilder {
    table: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    on_conflict: Option<OnConflict>,
}

impl InsertBuilder {
    /// Create a new INSERT builder for `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Set the inserted columns.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Add one row of values, in column order.
    pub fn row(mut self, values: Vec<Value>) -> Self {
        self.rows.push(values);
        self
    }

    /// Handle conflicts by doing nothing.
    pub fn on_conflict_do_nothing(mut self) -> Self {
        self.on_conflict = Some(OnConflict::DoNothing);
        self
    }

    /// Handle conflicts on `target` by updating `columns` (all non-target
    /// inserted columns when empty).
    pub fn on_conflict_target_do_update(mut self, target: &[&str], columns: &[&str]) -> Self {
        self.on_conflict = Some(OnConflict::DoUpdate {
            columns: columns.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    /// Set the conflict strategy.
    pub fn on_conflict(mut self, strategy: Option<OnConflict>) -> Self {
        self.on_conflict = strategy;
        self
    }

    /// Number of rows added so far.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Build the INSERT for `dialect`.
    pub fn build(&self, dialect: Dialect) -> Result<Statement> {
        if self.rows.is_empty() {
            return Err(Error::Query(format!("insert into {} without rows", self.table)));
        }
        if let Some(bad) = self.rows.iter().find(|r| r.len() != self.columns.len()) {
            return Err(Error::Query(format!(
                "insert into {}: {} values for {} columns",
                self.table,
                bad.len(),
                self.columns.len()
            )));
        }

        let update_sets = match &self.on_conflict {
            Some(OnConflict::DoUpdate { columns, target }) => {
                let chosen: Vec<&String> = if columns.is_empty() {
                    self.columns.iter().filter(|c| !target.contains(c)).collect()
                } else {
                    columns.iter().collect()
                };
                chosen
                    .iter()
                    .map(|c| format!("{} = {}", dialect.quote_ident(c), dialect.excluded(c)))
                    .collect::<Vec<_>>()
            }
            _ => Vec::new(),
        };
        // A DoUpdate with nothing to update degrades to DoNothing.
        let do_nothing = matches!(self.on_conflict, Some(OnConflict::DoNothing))
            || (matches!(self.on_conflict, Some(OnConflict::DoUpdate { .. }))
                && update_sets.is_empty());

        let verb = if do_nothing && dialect == Dialect::Mysql {
            "INSERT IGNORE INTO"
        } else {
            "INSERT INTO"
        };
        let mut sql = format!("{} {}", verb, dialect.quote_ident(&self.table));
        let mut params = Vec::new();

        if self.columns.is_empty() {
            match dialect {
                Dialect::Mysql => sql.push_str(" () VALUES ()"),
                Dialect::Sqlite | Dialect::Postgres => sql.push_str(" DEFAULT VALUES"),
            }
        } else {
            let cols: Vec<String> = self.columns.iter().map(|c| dialect.quote_ident(c)).collect();
            sql.push_str(" (");
            sql.push_str(&cols.join(", "));
            sql.push_str(") VALUES ");
            let tuple = format!("({})", vec!["?"; self.columns.len()].join(", "));
            sql.push_str(&vec![tuple; self.rows.len()].join(", "));
            for row in &self.rows {
                params.extend(row.iter().cloned());
            }
        }

        match (&self.on_conflict, dialect) {
            (None, _) => {}
            (Some(_), Dialect::Mysql) => {
                if !do_nothing {
                    sql.push_str(" ON DUPLICATE KEY UPDATE ");
                    sql.push_str(&update_sets.join(", "));
                }
            }
            (Some(_), Dialect::Sqlite | Dialect::Postgres) if do_nothing => {
                sql.push_str(" ON CONFLICT DO NOTHING");
            }
            (Some(OnConflict::DoUpdate { target, .. }), _) => {
                if target.is_empty() {
                    return Err(Error::Query(format!(
                        "upsert into {} requires a conflict target",
                        self.table
                    )));
                }
                let target: Vec<String> = target.iter().map(|c| dialect.quote_ident(c)).collect();
                sql.push_str(&format!(" ON CONFLICT ({}) DO UPDATE SET ", target.join(", ")));
                sql.push_str(&update_sets.join(", "));
            }
            (Some(OnConflict::DoNothing), _) => {}
        }

        Ok(Statement::finish(Fragment::new(sql, params), dialect))
    }
}

/// UPDATE query builder.
///
/// # Example
///
/// ```ignore
/// let stmt = UpdateBuilder::new("users")
///     .set("first_name", "Eko")
///     .set_expr("balance", Fragment::new("balance + ?", params![100_i64]))
///     .filter(Fragment::new("id = ?", params!["1"]))
///     .build(Dialect::Sqlite)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct UpdateBuilder {
    table: String,
    sets: Vec<(String, Fragment)>,
    filter: WhereClause,
    guards: Vec<Fragment>,
    allow_global: bool,
}

impl UpdateBuilder {
    /// Create a new UPDATE builder for `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Set a column to a value. A later set of the same column wins.
    pub fn set(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_expr(column, Fragment::new("?", vec![value.into()]))
    }

    /// Set a column to a SQL expression.
    pub fn set_expr(mut self, column: impl Into<String>, expr: Fragment) -> Self {
        let column = column.into();
        match self.sets.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = expr,
            None => self.sets.push((column, expr)),
        }
        self
    }

    /// Whether no column is set.
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Replace the user predicate.
    pub fn filter_clause(mut self, clause: WhereClause) -> Self {
        self.filter = clause;
        self
    }

    /// AND a predicate.
    pub fn filter(mut self, fragment: Fragment) -> Self {
        self.filter.and(fragment);
        self
    }

    /// Add a guard kept outside the user predicate.
    pub fn guard(mut self, fragment: Fragment) -> Self {
        self.guards.push(fragment);
        self
    }

    /// Permit an UPDATE without any user predicate.
    pub fn allow_global(mut self, value: bool) -> Self {
        self.allow_global = value;
        self
    }

    /// Build the UPDATE for `dialect`.
    pub fn build(&self, dialect: Dialect) -> Result<Statement> {
        if self.filter.is_empty() && !self.allow_global {
            return Err(Error::MissingWhereClause("UPDATE"));
        }
        if self.sets.is_empty() {
            return Err(Error::Query(format!("update of {} without columns", self.table)));
        }
        let mut fragment = Fragment::new(
            format!("UPDATE {} SET ", dialect.quote_ident(&self.table)),
            Vec::new(),
        );
        let mut first = true;
        for (column, expr) in &self.sets {
            if !first {
                fragment.sql.push_str(", ");
            }
            first = false;
            fragment.sql.push_str(&dialect.quote_ident(column));
            fragment.sql.push_str(" = ");
            fragment.sql.push_str(&expr.sql);
            fragment.params.extend(expr.params.iter().cloned());
        }
        let predicate = self.filter.with_guard(join_guards(&self.guards));
        if !predicate.is_empty() {
            fragment.push(" WHERE ", predicate);
        }
        Ok(Statement::finish(fragment, dialect))
    }
}

/// DELETE query builder.
#[derive(Debug, Clone, Default)]
pub struct DeleteBuilder {
    table: String,
    filter: WhereClause,
    allow_global: bool,
}

impl DeleteBuilder {
    /// Create a new DELETE builder for `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Replace the predicate.
    pub fn filter_clause(mut self, clause: WhereClause) -> Self {
        self.filter = clause;
        self
    }

    /// AND a predicate.
    pub fn filter(mut self, fragment: Fragment) -> Self {
        self.filter.and(fragment);
        self
    }

    /// Permit a DELETE without any predicate.
    pub fn allow_global(mut self, value: bool) -> Self {
        self.allow_global = value;
        self
    }

    /// Build the DELETE for `dialect`.
    pub fn build(&self, dialect: Dialect) -> Result<Statement> {
        if self.filter.is_empty() && !self.allow_global {
            return Err(Error::MissingWhereClause("DELETE"));
        }
        let mut fragment = Fragment::new(
            format!("DELETE FROM {}", dialect.quote_ident(&self.table)),
            Vec::new(),
        );
        if !self.filter.is_empty() {
            fragment.push(" WHERE ", self.filter.fragment().clone());
        }
        Ok(Statement::finish(fragment, dialect))
    }
}

pub(crate) fn join_guards(guards: &[Fragment]) -> Option<Fragment> {
    guards.iter().cloned().reduce(|mut acc, g| {
        acc.push(" AND ", g);
        acc
    })
}
