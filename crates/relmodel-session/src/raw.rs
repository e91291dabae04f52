//! Raw SQL passthrough and untyped table handles.

use relmodel_core::{Error, FromRecord, Record, Result, Row, Value, validate_identifier};
use relmodel_query::{Condition, DeleteBuilder, Fragment, InsertBuilder, Select, Statement};

use crate::engine::Access;
use crate::executor::Executor;

/// A raw SELECT with positional `?` parameters.
///
/// ```ignore
/// let totals: Vec<Total> = db
///     .raw("SELECT user_id, SUM(balance) AS total FROM wallets WHERE user_id IN ? GROUP BY user_id",
///          params![Value::list(["u1", "u2"])])
///     .scan()?;
/// ```
#[derive(Debug)]
pub struct Raw<'x, X> {
    exec: &'x X,
    sql: String,
    params: Vec<Value>,
}

impl<'x, X: Executor> Raw<'x, X> {
    pub(crate) fn new(exec: &'x X, sql: String, params: Vec<Value>) -> Self {
        Self { exec, sql, params }
    }

    fn statement(&self) -> Statement {
        Statement::finish(
            Fragment::new(self.sql.clone(), self.params.clone()),
            self.exec.context().dialect(),
        )
    }

    /// Result rows.
    pub fn rows(&self) -> Result<Vec<Row>> {
        let stmt = self.statement();
        self.exec.run(Access::Read, |engine| engine.query(&stmt))
    }

    /// Result rows mapped into `T`.
    pub fn scan<T: FromRecord>(&self) -> Result<Vec<T>> {
        self.rows()?
            .into_iter()
            .map(|row| T::from_record(&Record::from_row(row)))
            .collect()
    }

    /// First result row mapped into `T`; `NotFound` when there is none.
    pub fn scan_one<T: FromRecord>(&self) -> Result<T> {
        let row = self.rows()?.into_iter().next().ok_or(Error::NotFound)?;
        T::from_record(&Record::from_row(row))
    }
}

/// Map-based access to a table without an entity type, such as a join table.
#[derive(Debug)]
pub struct Table<'x, X> {
    exec: &'x X,
    name: String,
}

impl<'x, X: Executor> Table<'x, X> {
    pub(crate) fn new(exec: &'x X, name: &str) -> Result<Self> {
        validate_identifier(name)?;
        Ok(Self {
            exec,
            name: name.to_string(),
        })
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert one row.
    pub fn insert(&self, row: Row) -> Result<u64> {
        self.insert_many(vec![row])
    }

    /// Insert rows sharing the first row's columns.
    pub fn insert_many(&self, rows: Vec<Row>) -> Result<u64> {
        let Some(first) = rows.first() else {
            return Ok(0);
        };
        let columns: Vec<String> = first.columns().to_vec();
        let mut builder = InsertBuilder::new(self.name.as_str()).columns(columns.iter().cloned());
        for row in &rows {
            let values = columns
                .iter()
                .map(|c| {
                    row.get(c).cloned().ok_or_else(|| {
                        Error::Query(format!("row for `{}` is missing column `{}`", self.name, c))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            builder = builder.row(values);
        }
        let stmt = builder.build(self.exec.context().dialect())?;
        self.exec
            .run(Access::Write, |engine| Ok(engine.insert(&stmt)?.0))
    }

    fn select(&self, condition: Condition) -> Select {
        let dialect = self.exec.context().dialect();
        let mut select = Select::new(self.name.as_str());
        if let Some(fragment) = condition.translate(dialect, Some(&self.name)) {
            select = select.filter(fragment);
        }
        select
    }

    /// Rows matching `condition`.
    pub fn rows(&self, condition: impl Into<Condition>) -> Result<Vec<Row>> {
        let stmt = self
            .select(condition.into())
            .build(self.exec.context().dialect());
        self.exec.run(Access::Read, |engine| engine.query(&stmt))
    }

    /// Number of rows matching `condition`.
    pub fn count(&self, condition: impl Into<Condition>) -> Result<u64> {
        let stmt = self
            .select(condition.into())
            .build_count(self.exec.context().dialect());
        self.exec.run(Access::Read, |engine| {
            Ok(engine
                .query(&stmt)?
                .first()
                .and_then(|r| r.get_index(0))
                .and_then(Value::as_i64)
                .unwrap_or(0) as u64)
        })
    }

    /// Delete rows matching `condition`; an empty condition is refused.
    pub fn delete(&self, condition: impl Into<Condition>) -> Result<u64> {
        let dialect = self.exec.context().dialect();
        let mut builder = DeleteBuilder::new(self.name.as_str());
        if let Some(fragment) = condition.into().translate(dialect, Some(&self.name)) {
            builder = builder.filter(fragment);
        }
        let stmt = builder.build(dialect)?;
        self.exec.run(Access::Write, |engine| engine.execute(&stmt))
    }
}
