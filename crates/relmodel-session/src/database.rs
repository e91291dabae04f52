//! The database handle and explicit transactions.
//!
//! A [`Database`] bundles the connection pool, the schema registry and the
//! configuration. It is constructed explicitly and passed down; clones share
//! the pool and registry.
//!
//! ```ignore
//! let db = Database::connect(config, registry, || SqliteConnection::open("app.db"))?;
//!
//! db.transaction(|tx| {
//!     tx.create(&mut user)?;
//!     tx.model::<Wallet>().filter(("user_id = ?", params![user.id])).update("balance", 0)?;
//!     Ok(())
//! })?;
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use relmodel_core::{Connection, Error, Result, validate_identifier};
use relmodel_pool::{Pool, PoolStats, PooledConnection};
use relmodel_query::Dialect;
use relmodel_schema::Registry;

use crate::config::DatabaseConfig;
use crate::engine::{Access, Context, Engine, in_default_transaction};
use crate::executor::Executor;
use crate::tracker::StatementTracker;

// ============================================================================
// Database
// ============================================================================

/// Pool, registry and configuration.
pub struct Database<C: Connection> {
    pool: Pool<C>,
    ctx: Arc<Context>,
}

impl<C: Connection> Clone for Database<C> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            ctx: Arc::clone(&self.ctx),
        }
    }
}

impl<C: Connection> std::fmt::Debug for Database<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("pool", &self.pool)
            .field("dialect", &self.ctx.dialect())
            .field("entities", &self.ctx.registry().entity_names())
            .finish()
    }
}

impl<C: Connection> Database<C> {
    /// Wrap an existing pool. The registry's relations are validated here.
    pub fn new(
        pool: Pool<C>,
        registry: impl Into<Arc<Registry>>,
        config: DatabaseConfig,
    ) -> Result<Self> {
        let registry = registry.into();
        registry.validate()?;
        config.validate()?;
        tracing::debug!(
            dialect = ?config.dialect,
            entities = registry.entity_names().len(),
            skip_default_transaction = config.skip_default_transaction,
            "Opening database"
        );
        Ok(Self {
            pool,
            ctx: Arc::new(Context::new(registry, config)),
        })
    }

    /// Build a pool from `config.pool` and `factory`, then wrap it.
    pub fn connect<F>(
        config: DatabaseConfig,
        registry: impl Into<Arc<Registry>>,
        factory: F,
    ) -> Result<Self>
    where
        F: Fn() -> Result<C> + Send + Sync + 'static,
    {
        let pool = Pool::new(config.pool.clone(), factory)?;
        Self::new(pool, registry, config)
    }

    /// The schema registry.
    pub fn registry(&self) -> &Registry {
        self.ctx.registry()
    }

    /// The database configuration.
    pub fn config(&self) -> &DatabaseConfig {
        self.ctx.config()
    }

    /// The connection pool.
    pub fn pool(&self) -> &Pool<C> {
        &self.pool
    }

    /// Dialect statements are rendered in.
    pub fn dialect(&self) -> Dialect {
        self.ctx.dialect()
    }

    /// Pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Copy of the statement tracker as of now.
    pub fn tracker(&self) -> StatementTracker {
        self.ctx.tracker().clone()
    }

    /// Forget tracked statements, load counters and call sites.
    pub fn reset_tracker(&self) {
        self.ctx.tracker().reset();
    }

    /// Run a parameterless script outside any transaction, typically DDL.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let mut conn = self.pool.acquire()?;
        Engine::new(&mut *conn, &self.ctx, false).execute_batch(sql)
    }

    /// Check that a connection can be acquired and answers.
    pub fn ping(&self) -> Result<()> {
        self.pool.acquire()?.ping()
    }

    /// Close the pool. Idle connections are dropped; checked-out connections
    /// are dropped when returned; further acquires fail.
    pub fn close(&self) {
        tracing::debug!("Closing database");
        self.pool.close();
    }

    /// Start a manual transaction.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn begin(&self) -> Result<Tx<C>> {
        let mut conn = self.pool.acquire()?;
        let begin = self.ctx.dialect().begin_sql();
        Engine::new(&mut *conn, &self.ctx, false).execute_batch(begin)?;
        Ok(Tx::new(conn, Arc::clone(&self.ctx)))
    }

    /// Run `f` in a transaction: committed when `f` returns `Ok`, rolled back
    /// otherwise with the failure wrapped in `TransactionAborted`. A panic in
    /// `f` rolls back when the transaction is dropped.
    pub fn transaction<R>(&self, f: impl FnOnce(&Tx<C>) -> Result<R>) -> Result<R> {
        let tx = self.begin()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit().map_err(aborted)?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback) = tx.rollback() {
                    tracing::warn!(error = %rollback, "Rollback failed");
                }
                tracing::debug!(error = %error, "Transaction rolled back");
                Err(aborted(error))
            }
        }
    }
}

impl<C: Connection> Executor for Database<C> {
    fn context(&self) -> &Context {
        &self.ctx
    }

    fn run<R>(&self, access: Access, f: impl FnOnce(&mut Engine<'_>) -> Result<R>) -> Result<R> {
        let mut conn = self.pool.acquire()?;
        let mut engine = Engine::new(&mut *conn, &self.ctx, false);
        if access == Access::Write && !self.ctx.config().skip_default_transaction {
            in_default_transaction(&mut engine, f)
        } else {
            f(&mut engine)
        }
    }
}

fn aborted(error: Error) -> Error {
    match error {
        Error::TransactionAborted(_) => error,
        other => Error::TransactionAborted(Box::new(other)),
    }
}

// ============================================================================
// Transactions
// ============================================================================

struct TxState<C: Connection> {
    conn: PooledConnection<C>,
    finished: bool,
    savepoints: u32,
}

/// An open transaction holding one pooled connection.
///
/// Every operation issued through a `Tx` runs on its connection. `commit`
/// finishes it; `rollback` after a finished transaction is a no-op; dropping
/// an unfinished `Tx` rolls it back.
pub struct Tx<C: Connection> {
    state: Mutex<TxState<C>>,
    ctx: Arc<Context>,
}

impl<C: Connection> std::fmt::Debug for Tx<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Tx")
            .field("finished", &state.finished)
            .field("savepoints", &state.savepoints)
            .finish_non_exhaustive()
    }
}

impl<C: Connection> Tx<C> {
    fn new(conn: PooledConnection<C>, ctx: Arc<Context>) -> Self {
        Self {
            state: Mutex::new(TxState {
                conn,
                finished: false,
                savepoints: 0,
            }),
            ctx,
        }
    }

    /// Whether `commit` or `rollback` has run.
    pub fn is_finished(&self) -> bool {
        self.state.lock().finished
    }

    fn control(&self, sql: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.finished {
            return Err(finished());
        }
        Engine::new(&mut *state.conn, &self.ctx, true).execute_batch(sql)
    }

    /// Commit. Fails when the transaction already finished.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn commit(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.finished {
            return Err(finished());
        }
        Engine::new(&mut *state.conn, &self.ctx, true).execute_batch("COMMIT")?;
        state.finished = true;
        Ok(())
    }

    /// Roll back; a no-op once the transaction finished.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn rollback(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.finished {
            return Ok(());
        }
        state.finished = true;
        Engine::new(&mut *state.conn, &self.ctx, true).execute_batch("ROLLBACK")
    }

    /// Create a named savepoint.
    pub fn savepoint(&self, name: &str) -> Result<()> {
        let name = self.ctx.dialect().quote_ident(validate_identifier(name)?);
        self.control(&format!("SAVEPOINT {name}"))
    }

    /// Undo everything since `savepoint(name)`; the savepoint stays open.
    pub fn rollback_to(&self, name: &str) -> Result<()> {
        let name = self.ctx.dialect().quote_ident(validate_identifier(name)?);
        self.control(&format!("ROLLBACK TO SAVEPOINT {name}"))
    }

    /// Forget a savepoint, keeping its changes.
    pub fn release(&self, name: &str) -> Result<()> {
        let name = self.ctx.dialect().quote_ident(validate_identifier(name)?);
        self.control(&format!("RELEASE SAVEPOINT {name}"))
    }

    /// Run `f` inside a savepoint: released on `Ok`, rolled back to on `Err`
    /// with the failure wrapped in `TransactionAborted`. The enclosing
    /// transaction stays usable either way.
    pub fn transaction<R>(&self, f: impl FnOnce(&Self) -> Result<R>) -> Result<R> {
        let name = {
            let mut state = self.state.lock();
            state.savepoints += 1;
            format!("relmodel_sp_{}", state.savepoints)
        };
        self.savepoint(&name)?;
        match f(self) {
            Ok(value) => {
                self.release(&name)?;
                Ok(value)
            }
            Err(error) => {
                self.rollback_to(&name)?;
                self.release(&name)?;
                tracing::debug!(savepoint = %name, error = %error, "Nested transaction rolled back");
                Err(aborted(error))
            }
        }
    }
}

fn finished() -> Error {
    Error::Query("transaction already committed or rolled back".to_string())
}

impl<C: Connection> Executor for Tx<C> {
    fn context(&self) -> &Context {
        &self.ctx
    }

    fn run<R>(&self, _access: Access, f: impl FnOnce(&mut Engine<'_>) -> Result<R>) -> Result<R> {
        let mut state = self.state.lock();
        if state.finished {
            return Err(finished());
        }
        let mut engine = Engine::new(&mut *state.conn, &self.ctx, true);
        f(&mut engine)
    }
}

impl<C: Connection> Drop for Tx<C> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.finished {
            return;
        }
        state.finished = true;
        tracing::debug!(panicking = std::thread::panicking(), "Rolling back unfinished transaction");
        if let Err(error) = Engine::new(&mut *state.conn, &self.ctx, true).execute_batch("ROLLBACK") {
            tracing::warn!(error = %error, "Rollback of dropped transaction failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmodel_core::{Row, Value};
    use relmodel_pool::PoolConfig;
    use relmodel_sqlite::SqliteConnection;

    fn database() -> (tempfile::TempDir, Database<SqliteConnection>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tx.db");
        let db = Database::connect(
            DatabaseConfig::new().pool(PoolConfig::new(2)),
            Registry::new(),
            move || SqliteConnection::open(&path),
        )
        .unwrap();
        db.execute_batch("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        (dir, db)
    }

    fn count(db: &Database<SqliteConnection>) -> i64 {
        let rows: Vec<Row> = db.raw("SELECT COUNT(*) AS n FROM items", Vec::new()).rows().unwrap();
        rows[0].get("n").and_then(Value::as_i64).unwrap()
    }

    #[test]
    fn test_transaction_commits_on_ok() {
        let (_dir, db) = database();
        db.transaction(|tx| {
            tx.exec("INSERT INTO items (name) VALUES (?)", vec![Value::from("a")])?;
            Ok(())
        })
        .unwrap();
        assert_eq!(count(&db), 1);
    }

    #[test]
    fn test_transaction_rolls_back_on_err() {
        let (_dir, db) = database();
        let err = db
            .transaction(|tx| {
                tx.exec("INSERT INTO items (name) VALUES (?)", vec![Value::from("a")])?;
                Err::<(), _>(Error::Custom("stop".into()))
            })
            .unwrap_err();
        assert!(matches!(err, Error::TransactionAborted(_)));
        assert!(matches!(err.root(), Error::Custom(m) if m == "stop"));
        assert_eq!(count(&db), 0);
    }

    #[test]
    fn test_rollback_after_commit_is_noop() {
        let (_dir, db) = database();
        let tx = db.begin().unwrap();
        tx.exec("INSERT INTO items (name) VALUES ('a')", Vec::new()).unwrap();
        tx.commit().unwrap();
        tx.rollback().unwrap();
        assert!(tx.commit().is_err());
        assert_eq!(count(&db), 1);
    }

    #[test]
    fn test_drop_rolls_back() {
        let (_dir, db) = database();
        {
            let tx = db.begin().unwrap();
            tx.exec("INSERT INTO items (name) VALUES ('a')", Vec::new()).unwrap();
        }
        assert_eq!(count(&db), 0);
        assert_eq!(db.stats().active_connections, 0);
    }

    #[test]
    fn test_savepoints() {
        let (_dir, db) = database();
        let tx = db.begin().unwrap();
        tx.exec("INSERT INTO items (name) VALUES ('kept')", Vec::new()).unwrap();
        tx.savepoint("sp1").unwrap();
        tx.exec("INSERT INTO items (name) VALUES ('undone')", Vec::new()).unwrap();
        tx.rollback_to("sp1").unwrap();
        tx.release("sp1").unwrap();
        tx.commit().unwrap();
        assert_eq!(count(&db), 1);
        assert!(tx.savepoint("bad name").is_err());
    }

    #[test]
    fn test_nested_transaction_keeps_outer() {
        let (_dir, db) = database();
        db.transaction(|tx| {
            tx.exec("INSERT INTO items (name) VALUES ('outer')", Vec::new())?;
            let inner = tx.transaction(|tx| {
                tx.exec("INSERT INTO items (name) VALUES ('inner')", Vec::new())?;
                Err::<(), _>(Error::Custom("inner failed".into()))
            });
            assert!(inner.is_err());
            Ok(())
        })
        .unwrap();
        assert_eq!(count(&db), 1);
    }

    #[test]
    fn test_operations_after_finish_fail() {
        let (_dir, db) = database();
        let tx = db.begin().unwrap();
        tx.rollback().unwrap();
        assert!(tx.exec("DELETE FROM items WHERE id = 1", Vec::new()).is_err());
    }
}
