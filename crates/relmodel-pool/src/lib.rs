//! Bounded, blocking connection pool for relmodel.
//!
//! `Pool<C>` hands out [`PooledConnection`] guards over connections built by
//! a factory closure:
//!
//! - at most `max_open` connections exist at any time;
//! - at most `max_idle` are kept for reuse, the rest are closed on return;
//! - connections past `max_lifetime` or idle past `max_idle_time` are retired;
//! - an acquire on an exhausted pool blocks, and fails with a pool timeout
//!   once `acquire_timeout` elapses.
//!
//! # Example
//!
//! ```ignore
//! let pool = Pool::new(PoolConfig::new(4), || SqliteConnection::open("app.db"))?;
//! let mut conn = pool.acquire()?;
//! conn.execute("DELETE FROM sessions", &[])?;
//! // returned to the pool here
//! ```

pub mod config;

pub use config::PoolConfig;

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use relmodel_core::{Connection, PoolError, Result};

/// Factory building new connections.
pub type ConnectionFactory<C> = Box<dyn Fn() -> Result<C> + Send + Sync>;

/// Pool statistics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Open connections (idle plus in use).
    pub total_connections: usize,
    /// Idle connections.
    pub idle_connections: usize,
    /// Connections handed out.
    pub active_connections: usize,
    /// Callers currently blocked in `acquire`.
    pub pending_requests: usize,
    /// Connections created since the pool started.
    pub connections_created: u64,
    /// Connections closed since the pool started.
    pub connections_closed: u64,
    /// Successful acquires.
    pub acquires: u64,
    /// Acquires that timed out.
    pub timeouts: u64,
}

struct Idle<C> {
    conn: C,
    created_at: Instant,
    idle_since: Instant,
}

struct State<C> {
    idle: VecDeque<Idle<C>>,
    open: usize,
    waiting: usize,
    closed: bool,
    created: u64,
    retired: u64,
    acquires: u64,
    timeouts: u64,
}

struct Inner<C> {
    config: PoolConfig,
    factory: ConnectionFactory<C>,
    state: Mutex<State<C>>,
    available: Condvar,
}

impl<C> Inner<C> {
    fn expired(&self, created_at: Instant, idle_since: Option<Instant>, now: Instant) -> bool {
        let too_old = self
            .config
            .max_lifetime
            .is_some_and(|max| now.duration_since(created_at) >= max);
        let idle_too_long = match (self.config.max_idle_time, idle_since) {
            (Some(max), Some(since)) => now.duration_since(since) >= max,
            _ => false,
        };
        too_old || idle_too_long
    }

    fn release(&self, conn: C, created_at: Instant) {
        let now = Instant::now();
        let mut state = self.state.lock();
        let keep = !state.closed
            && state.idle.len() < self.config.max_idle
            && !self.expired(created_at, None, now);
        if keep {
            state.idle.push_back(Idle {
                conn,
                created_at,
                idle_since: now,
            });
        } else {
            state.open -= 1;
            state.retired += 1;
            drop(state);
            drop(conn);
            tracing::trace!("Connection closed on return");
        }
        self.available.notify_one();
    }

    fn forget(&self) {
        let mut state = self.state.lock();
        state.open -= 1;
        state.retired += 1;
        drop(state);
        self.available.notify_one();
    }
}

/// A bounded pool of connections.
///
/// Cloning is cheap; clones share the same connections.
pub struct Pool<C: Connection> {
    inner: Arc<Inner<C>>,
}

impl<C: Connection> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connection> fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<C: Connection> Pool<C> {
    /// Create a pool. No connection is opened until the first acquire.
    pub fn new<F>(config: PoolConfig, factory: F) -> Result<Self>
    where
        F: Fn() -> Result<C> + Send + Sync + 'static,
    {
        config.validate()?;
        tracing::debug!(
            max_open = config.max_open,
            max_idle = config.max_idle,
            acquire_timeout_ms = config.acquire_timeout.as_millis() as u64,
            "Creating connection pool"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                factory: Box::new(factory),
                state: Mutex::new(State {
                    idle: VecDeque::new(),
                    open: 0,
                    waiting: 0,
                    closed: false,
                    created: 0,
                    retired: 0,
                    acquires: 0,
                    timeouts: 0,
                }),
                available: Condvar::new(),
            }),
        })
    }

    /// The pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Acquire a connection, blocking up to `acquire_timeout`.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn acquire(&self) -> Result<PooledConnection<C>> {
        let started = Instant::now();
        let deadline = started + self.inner.config.acquire_timeout;
        let mut state = self.inner.state.lock();
        loop {
            if state.closed {
                return Err(PoolError::closed().into());
            }

            let now = Instant::now();
            while let Some(idle) = state.idle.pop_front() {
                if self.inner.expired(idle.created_at, Some(idle.idle_since), now) {
                    state.open -= 1;
                    state.retired += 1;
                    tracing::trace!("Retiring expired idle connection");
                    continue;
                }
                state.acquires += 1;
                return Ok(PooledConnection::new(
                    idle.conn,
                    idle.created_at,
                    Arc::clone(&self.inner),
                ));
            }

            if state.open < self.inner.config.max_open {
                state.open += 1;
                drop(state);
                return match (self.inner.factory)() {
                    Ok(conn) => {
                        let mut state = self.inner.state.lock();
                        state.created += 1;
                        state.acquires += 1;
                        drop(state);
                        tracing::debug!("Opened new pooled connection");
                        Ok(PooledConnection::new(conn, now, Arc::clone(&self.inner)))
                    }
                    Err(e) => {
                        let mut state = self.inner.state.lock();
                        state.open -= 1;
                        drop(state);
                        self.inner.available.notify_one();
                        Err(e)
                    }
                };
            }

            state.waiting += 1;
            let result = self.inner.available.wait_until(&mut state, deadline);
            state.waiting -= 1;
            if result.timed_out()
                && state.idle.is_empty()
                && state.open >= self.inner.config.max_open
            {
                state.timeouts += 1;
                let waited = started.elapsed();
                tracing::warn!(
                    waited_ms = waited.as_millis() as u64,
                    max_open = self.inner.config.max_open,
                    "Connection pool acquire timed out"
                );
                return Err(PoolError::timeout(waited).into());
            }
        }
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            total_connections: state.open,
            idle_connections: state.idle.len(),
            active_connections: state.open - state.idle.len(),
            pending_requests: state.waiting,
            connections_created: state.created,
            connections_closed: state.retired,
            acquires: state.acquires,
            timeouts: state.timeouts,
        }
    }

    /// Close the pool: idle connections are dropped, in-use connections are
    /// closed when returned, and blocked or later acquires fail.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let idle: Vec<Idle<C>> = state.idle.drain(..).collect();
        state.open -= idle.len();
        state.retired += idle.len() as u64;
        drop(state);
        drop(idle);
        self.inner.available.notify_all();
        tracing::debug!("Connection pool closed");
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }
}

/// A connection on loan from a [`Pool`]; returned when dropped.
pub struct PooledConnection<C: Connection> {
    conn: Option<C>,
    created_at: Instant,
    pool: Arc<Inner<C>>,
}

impl<C: Connection> PooledConnection<C> {
    fn new(conn: C, created_at: Instant, pool: Arc<Inner<C>>) -> Self {
        Self {
            conn: Some(conn),
            created_at,
            pool,
        }
    }

    /// Close this connection instead of returning it, e.g. after a
    /// connection-level failure.
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            drop(conn);
            self.pool.forget();
        }
    }
}

impl<C: Connection> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        // Only `discard` and `drop` take the connection, and both consume the guard.
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl<C: Connection> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut C {
        match &mut self.conn {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl<C: Connection> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn, self.created_at);
        }
    }
}

impl<C: Connection> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("age", &self.created_at.elapsed())
            .finish()
    }
}
