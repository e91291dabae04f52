//! SQL dialects.
//!
//! Builders write `?` placeholders and unquoted-by-default raw fragments; the
//! dialect decides identifier quoting, placeholder numbering, lock clauses and
//! upsert syntax when a statement is finished.

use serde::{Deserialize, Serialize};

/// Row lock strength for `SELECT ... FOR UPDATE/SHARE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStrength {
    /// Exclusive row lock.
    Update,
    /// Shared row lock.
    Share,
}

/// Target SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// SQLite: `?N` placeholders, `"ident"` quoting, no row locks.
    #[default]
    Sqlite,
    /// PostgreSQL: `$N` placeholders, `"ident"` quoting.
    Postgres,
    /// MySQL: `?` placeholders, `` `ident` `` quoting.
    Mysql,
}

impl Dialect {
    /// Placeholder for the `index`-th (1-based) parameter.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Sqlite => format!("?{}", index),
            Dialect::Postgres => format!("${}", index),
            Dialect::Mysql => "?".to_string(),
        }
    }

    /// Quote an identifier; dotted names are quoted per segment.
    pub fn quote_ident(self, name: &str) -> String {
        let (open, close, escape) = match self {
            Dialect::Sqlite | Dialect::Postgres => ('"', '"', "\"\""),
            Dialect::Mysql => ('`', '`', "``"),
        };
        name.split('.')
            .map(|part| {
                let escaped = part.replace(close, escape);
                format!("{open}{escaped}{close}")
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// `table.column`, both quoted.
    pub fn qualified(self, table: &str, column: &str) -> String {
        format!("{}.{}", self.quote_ident(table), self.quote_ident(column))
    }

    /// Rewrite `?` placeholders outside string literals and quoted identifiers
    /// into this dialect's numbered form.
    pub fn rewrite_placeholders(self, sql: &str) -> String {
        if self == Dialect::Mysql {
            return sql.to_string();
        }
        let mut out = String::with_capacity(sql.len() + 8);
        let mut index = 0;
        let mut quote: Option<char> = None;
        for c in sql.chars() {
            match quote {
                Some(q) => {
                    if c == q {
                        quote = None;
                    }
                    out.push(c);
                }
                None => match c {
                    '\'' | '"' | '`' => {
                        quote = Some(c);
                        out.push(c);
                    }
                    '?' => {
                        index += 1;
                        out.push_str(&self.placeholder(index));
                    }
                    _ => out.push(c),
                },
            }
        }
        out
    }

    /// Lock clause appended to a SELECT, if the dialect supports row locks.
    pub fn lock_clause(self, strength: LockStrength) -> Option<&'static str> {
        match (self, strength) {
            (Dialect::Sqlite, _) => None,
            (_, LockStrength::Update) => Some("FOR UPDATE"),
            (_, LockStrength::Share) => Some("FOR SHARE"),
        }
    }

    /// Statement that opens a transaction.
    ///
    /// SQLite takes the write lock up front so concurrent writers serialise
    /// instead of failing on lock upgrade.
    pub fn begin_sql(self) -> &'static str {
        match self {
            Dialect::Sqlite => "BEGIN IMMEDIATE",
            Dialect::Postgres => "BEGIN",
            Dialect::Mysql => "START TRANSACTION",
        }
    }

    /// Reference to the proposed value of `column` inside an upsert SET list.
    pub fn excluded(self, column: &str) -> String {
        match self {
            Dialect::Sqlite | Dialect::Postgres => {
                format!("excluded.{}", self.quote_ident(column))
            }
            Dialect::Mysql => format!("VALUES({})", self.quote_ident(column)),
        }
    }
}
