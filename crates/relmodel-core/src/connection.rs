//! The driver-facing connection contract.

use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// A blocking database connection.
///
/// Parameters arrive flattened: list parameters have already been expanded by
/// the query builder, so drivers bind exactly one value per `?` placeholder.
/// A connection is used by one caller at a time; the pool hands out exclusive
/// guards.
pub trait Connection: Send + 'static {
    /// Run a statement returning rows.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Run a statement, returning the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Run an INSERT, returning the affected rows and the last generated id.
    fn insert(&mut self, sql: &str, params: &[Value]) -> Result<(u64, Option<i64>)>;

    /// Run several parameterless statements separated by `;`.
    fn execute_batch(&mut self, sql: &str) -> Result<()>;

    /// Cheap liveness check used by the pool before reusing an idle connection.
    fn ping(&mut self) -> Result<()>;
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        (**self).query(sql, params)
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        (**self).execute(sql, params)
    }

    fn insert(&mut self, sql: &str, params: &[Value]) -> Result<(u64, Option<i64>)> {
        (**self).insert(sql, params)
    }

    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        (**self).execute_batch(sql)
    }

    fn ping(&mut self) -> Result<()> {
        (**self).ping()
    }
}
