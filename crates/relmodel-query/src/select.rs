//! SELECT statement builder.

use crate::condition::WhereClause;
use crate::dialect::{Dialect, LockStrength};
use crate::statement::{Fragment, Statement};
use crate::write::join_guards;

/// A join clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Full join SQL (`LEFT JOIN "wallets" AS "wallet" ON ...`).
    pub fragment: Fragment,
}

/// SELECT builder.
///
/// The user predicate (`filter`) and the guards (soft-delete exclusions) are
/// kept apart so guards always wrap the user's group from the outside:
/// `WHERE (user predicate) AND guard`.
///
/// # Example
///
/// ```
/// use relmodel_query::{Dialect, Fragment, Select};
///
/// let stmt = Select::new("users")
///     .filter(Fragment::new("first_name = ?", vec!["Eko".into()]))
///     .order_by("id asc")
///     .limit(10)
///     .build(Dialect::Sqlite);
/// assert_eq!(
///     stmt.sql,
///     "SELECT \"users\".* FROM \"users\" WHERE (first_name = ?1) ORDER BY id asc LIMIT 10"
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct Select {
    table: String,
    alias: Option<String>,
    columns: Vec<String>,
    distinct: bool,
    joins: Vec<Join>,
    filter: WhereClause,
    guards: Vec<Fragment>,
    group_by: Vec<String>,
    having: WhereClause,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    lock: Option<LockStrength>,
}

impl Select {
    /// SELECT from `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Alias the root table.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Add projection expressions (raw SQL). Empty means `table.*`.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// SELECT DISTINCT.
    pub fn distinct(mut self, value: bool) -> Self {
        self.distinct = value;
        self
    }

    /// Add a join.
    pub fn join(mut self, fragment: Fragment) -> Self {
        self.joins.push(Join { fragment });
        self
    }

    /// Replace the user predicate.
    pub fn filter_clause(mut self, clause: WhereClause) -> Self {
        self.filter = clause;
        self
    }

    /// AND a predicate into the user group.
    pub fn filter(mut self, fragment: Fragment) -> Self {
        self.filter.and(fragment);
        self
    }

    /// Add a guard kept outside the user group.
    pub fn guard(mut self, fragment: Fragment) -> Self {
        self.guards.push(fragment);
        self
    }

    /// GROUP BY expressions.
    pub fn group_by(mut self, expr: impl Into<String>) -> Self {
        self.group_by.push(expr.into());
        self
    }

    /// Replace the HAVING predicate.
    pub fn having_clause(mut self, clause: WhereClause) -> Self {
        self.having = clause;
        self
    }

    /// ORDER BY expression (raw SQL, e.g. `"id desc"`).
    pub fn order_by(mut self, expr: impl Into<String>) -> Self {
        self.order_by.push(expr.into());
        self
    }

    /// LIMIT.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// OFFSET.
    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Row lock.
    pub fn lock(mut self, strength: LockStrength) -> Self {
        self.lock = Some(strength);
        self
    }

    /// Name the root table is referenced by (alias or table name).
    pub fn reference_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    fn where_fragment(&self) -> Fragment {
        self.filter.with_guard(join_guards(&self.guards))
    }

    fn body(&self, dialect: Dialect, projection: &str) -> Fragment {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(projection);
        sql.push_str(" FROM ");
        sql.push_str(&dialect.quote_ident(&self.table));
        if let Some(alias) = &self.alias {
            sql.push_str(" AS ");
            sql.push_str(&dialect.quote_ident(alias));
        }
        let mut fragment = Fragment::new(sql, Vec::new());

        for join in &self.joins {
            fragment.push(" ", join.fragment.clone());
        }

        let predicate = self.where_fragment();
        if !predicate.is_empty() {
            fragment.push(" WHERE ", predicate);
        }

        if !self.group_by.is_empty() {
            fragment.sql.push_str(" GROUP BY ");
            fragment.sql.push_str(&self.group_by.join(", "));
            if !self.having.is_empty() {
                fragment.push(" HAVING ", self.having.fragment().clone());
            }
        }
        fragment
    }

    fn projection(&self, dialect: Dialect) -> String {
        if self.columns.is_empty() {
            format!("{}.*", dialect.quote_ident(self.reference_name()))
        } else {
            self.columns.join(", ")
        }
    }

    /// Build the SELECT.
    pub fn build(&self, dialect: Dialect) -> Statement {
        let projection = self.projection(dialect);
        let mut fragment = self.body(dialect, &projection);

        if !self.order_by.is_empty() {
            fragment.sql.push_str(" ORDER BY ");
            fragment.sql.push_str(&self.order_by.join(", "));
        }
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => {
                fragment.sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
            }
            (Some(limit), None) => fragment.sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset)) => match dialect {
                Dialect::Sqlite => fragment.sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
                Dialect::Mysql => fragment
                    .sql
                    .push_str(&format!(" LIMIT 18446744073709551615 OFFSET {}", offset)),
                Dialect::Postgres => fragment.sql.push_str(&format!(" OFFSET {}", offset)),
            },
            (None, None) => {}
        }
        if let Some(clause) = self.lock.and_then(|strength| dialect.lock_clause(strength)) {
            fragment.sql.push(' ');
            fragment.sql.push_str(clause);
        }
        Statement::finish(fragment, dialect)
    }

    /// Build `SELECT COUNT(*)` over the same rows (ordering, paging and locks
    /// are dropped).
    pub fn build_count(&self, dialect: Dialect) -> Statement {
        let projection = self.projection(dialect);
        let inner = self.body(dialect, &projection);
        let fragment = Fragment::new(
            format!("SELECT COUNT(*) FROM ({}) AS count_source", inner.sql),
            inner.params,
        );
        Statement::finish(fragment, dialect)
    }
}
