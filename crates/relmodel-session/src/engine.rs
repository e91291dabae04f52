//! Statement execution.
//!
//! [`Engine`] is a borrowed connection plus the shared [`Context`]: every
//! statement the crate issues goes through [`Engine::query`],
//! [`Engine::execute`] or [`Engine::insert`], which log it, time it, warn
//! about slow statements and feed the [`StatementTracker`].
//!
//! Where an engine's connection comes from, and whether a write gets an
//! implicit transaction, is decided by the [`Executor`](crate::Executor).

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};
use relmodel_core::{Connection, Result, Row};
use relmodel_query::{Dialect, Statement};
use relmodel_schema::Registry;

use crate::config::DatabaseConfig;
use crate::tracker::StatementTracker;

/// State shared by a database and every transaction opened from it.
#[derive(Debug)]
pub struct Context {
    registry: Arc<Registry>,
    config: DatabaseConfig,
    tracker: Mutex<StatementTracker>,
}

impl Context {
    pub(crate) fn new(registry: Arc<Registry>, config: DatabaseConfig) -> Self {
        let mut tracker = StatementTracker::new().with_threshold(config.lazy_load_threshold);
        tracker.set_recording(config.track_statements);
        Self {
            registry,
            config,
            tracker: Mutex::new(tracker),
        }
    }

    /// The schema registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Shared handle to the schema registry.
    pub fn registry_arc(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// The database configuration.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Dialect statements are rendered in.
    pub fn dialect(&self) -> Dialect {
        self.config.dialect
    }

    /// Lock the statement tracker. Nothing may run through the engine while
    /// the guard is held.
    pub(crate) fn tracker(&self) -> MutexGuard<'_, StatementTracker> {
        self.tracker.lock()
    }
}

/// What an operation does to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Reads only.
    Read,
    /// Writes; wrapped in a transaction unless one is already open or the
    /// default transaction is disabled.
    Write,
}

/// A connection borrowed for one operation.
pub struct Engine<'c> {
    conn: &'c mut dyn Connection,
    ctx: &'c Context,
    in_transaction: bool,
}

impl std::fmt::Debug for Engine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("dialect", &self.ctx.dialect())
            .field("in_transaction", &self.in_transaction)
            .finish_non_exhaustive()
    }
}

impl<'c> Engine<'c> {
    pub(crate) fn new(conn: &'c mut dyn Connection, ctx: &'c Context, in_transaction: bool) -> Self {
        Self {
            conn,
            ctx,
            in_transaction,
        }
    }

    /// Shared context.
    pub fn context(&self) -> &'c Context {
        self.ctx
    }

    /// The schema registry.
    pub fn registry(&self) -> &'c Registry {
        self.ctx.registry()
    }

    /// Dialect statements are rendered in.
    pub fn dialect(&self) -> Dialect {
        self.ctx.dialect()
    }

    /// Whether the connection has an open transaction.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Run a statement returning rows.
    pub fn query(&mut self, stmt: &Statement) -> Result<Vec<Row>> {
        let started = Instant::now();
        let outcome = self.conn.query(&stmt.sql, &stmt.params);
        self.observe(stmt, started, outcome.as_ref().map(|rows| rows.len() as u64));
        outcome
    }

    /// Run a statement, returning the affected row count.
    pub fn execute(&mut self, stmt: &Statement) -> Result<u64> {
        let started = Instant::now();
        let outcome = self.conn.execute(&stmt.sql, &stmt.params);
        self.observe(stmt, started, outcome.as_ref().map(|n| *n));
        outcome
    }

    /// Run an INSERT, returning the affected row count and the generated key.
    pub fn insert(&mut self, stmt: &Statement) -> Result<(u64, Option<i64>)> {
        let started = Instant::now();
        let outcome = self.conn.insert(&stmt.sql, &stmt.params);
        self.observe(stmt, started, outcome.as_ref().map(|(n, _)| *n));
        outcome
    }

    /// Run a parameterless script (transaction control, DDL).
    pub fn execute_batch(&mut self, sql: &str) -> Result<()> {
        let stmt = Statement {
            sql: sql.to_string(),
            params: Vec::new(),
        };
        let started = Instant::now();
        let outcome = self.conn.execute_batch(sql);
        self.observe(&stmt, started, outcome.as_ref().map(|_| 0));
        outcome
    }

    pub(crate) fn set_in_transaction(&mut self, value: bool) {
        self.in_transaction = value;
    }

    fn observe(
        &self,
        stmt: &Statement,
        started: Instant,
        outcome: std::result::Result<u64, &relmodel_core::Error>,
    ) {
        let elapsed = started.elapsed();
        let elapsed_us = elapsed.as_micros() as u64;
        match outcome {
            Ok(rows) => {
                tracing::debug!(
                    target: "relmodel::sql",
                    sql = %stmt.sql,
                    params = ?stmt.params,
                    rows,
                    elapsed_us,
                    "Executed statement"
                );
                self.ctx
                    .tracker()
                    .record_statement(&stmt.sql, stmt.params.len(), rows, elapsed);
            }
            Err(error) => {
                tracing::debug!(
                    target: "relmodel::sql",
                    sql = %stmt.sql,
                    params = ?stmt.params,
                    elapsed_us,
                    error = %error,
                    "Statement failed"
                );
            }
        }
        let threshold = self.ctx.config().slow_threshold;
        if elapsed >= threshold {
            tracing::warn!(
                target: "relmodel::sql",
                sql = %stmt.sql,
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = threshold.as_millis() as u64,
                "Slow statement"
            );
        }
    }
}

/// Run `f` inside `BEGIN` / `COMMIT`, rolling back when it fails, when the
/// commit fails or when `f` panics.
pub(crate) fn in_default_transaction<R>(
    engine: &mut Engine<'_>,
    f: impl FnOnce(&mut Engine<'_>) -> Result<R>,
) -> Result<R> {
    let begin = engine.dialect().begin_sql();
    engine.execute_batch(begin)?;
    engine.set_in_transaction(true);
    let mut guard = DefaultTransaction { engine, open: true };
    let outcome = f(&mut *guard.engine);
    guard.finish(outcome)
}

/// An implicit transaction; rolled back on drop unless finished.
struct DefaultTransaction<'e, 'c> {
    engine: &'e mut Engine<'c>,
    open: bool,
}

impl DefaultTransaction<'_, '_> {
    fn finish<R>(mut self, outcome: Result<R>) -> Result<R> {
        self.open = false;
        self.engine.set_in_transaction(false);
        match outcome {
            Ok(value) => match self.engine.execute_batch("COMMIT") {
                Ok(()) => Ok(value),
                Err(error) => {
                    tracing::debug!(error = %error, "Commit of default transaction failed");
                    self.rollback();
                    Err(error)
                }
            },
            Err(error) => {
                self.rollback();
                Err(error)
            }
        }
    }

    fn rollback(&mut self) {
        if let Err(error) = self.engine.execute_batch("ROLLBACK") {
            tracing::warn!(error = %error, "Rollback of default transaction failed");
        }
    }
}

impl Drop for DefaultTransaction<'_, '_> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.engine.set_in_transaction(false);
        tracing::debug!(panicking = std::thread::panicking(), "Rolling back default transaction");
        self.rollback();
    }
}
