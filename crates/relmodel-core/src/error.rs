//! Error types shared by every relmodel crate.
//!
//! Library errors are never swallowed: each operation returns the first error it
//! meets to its immediate caller. Nothing in the core retries.

use std::fmt;
use std::time::Duration;

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// The kind of integrity constraint a statement violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// Duplicate primary key or unique index entry.
    Unique,
    /// Foreign key reference to a missing row (or a row still referenced).
    ForeignKey,
    /// NULL written to a NOT NULL column.
    NotNull,
    /// CHECK constraint failure.
    Check,
    /// Anything else the driver reported as a constraint failure.
    Other,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConstraintKind::Unique => "unique",
            ConstraintKind::ForeignKey => "foreign key",
            ConstraintKind::NotNull => "not null",
            ConstraintKind::Check => "check",
            ConstraintKind::Other => "constraint",
        };
        f.write_str(s)
    }
}

/// Why a pool could not hand out a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolErrorKind {
    /// Every connection stayed busy for the whole acquire timeout.
    Timeout,
    /// The pool was closed.
    Closed,
    /// The pool configuration is invalid.
    Config,
}

/// Error raised by the connection pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("pool {kind:?}: {message}")]
pub struct PoolError {
    /// Failure class.
    pub kind: PoolErrorKind,
    /// Human readable detail.
    pub message: String,
}

impl PoolError {
    /// Acquire timed out after `waited`.
    pub fn timeout(waited: Duration) -> Self {
        Self {
            kind: PoolErrorKind::Timeout,
            message: format!("no connection available after {:?}", waited),
        }
    }

    /// The pool has been closed.
    pub fn closed() -> Self {
        Self {
            kind: PoolErrorKind::Closed,
            message: "pool is closed".to_string(),
        }
    }

    /// Invalid configuration.
    pub fn config(message: impl Into<String>) -> Self {
        Self {
            kind: PoolErrorKind::Config,
            message: message.into(),
        }
    }
}

/// Every failure a relmodel operation can report.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport, authentication or open failure. Fatal for the operation.
    #[error("connection error: {0}")]
    Connection(String),

    /// A statement violated an integrity constraint.
    #[error("{kind} constraint violation: {message}")]
    ConstraintViolation {
        /// Which constraint family failed.
        kind: ConstraintKind,
        /// Driver message.
        message: String,
    },

    /// A row could not be mapped onto the target shape.
    #[error("mapping error: {0}")]
    Mapping(String),

    /// The entity type was never registered.
    #[error("unknown entity `{0}`")]
    UnknownEntity(String),

    /// The entity declares no relationship with that name.
    #[error("entity `{entity}` has no relationship `{relation}`")]
    UnknownRelation {
        /// Entity that was asked.
        entity: String,
        /// Relationship name that was not found.
        relation: String,
    },

    /// Registering a second definition under an existing entity name.
    #[error("entity `{0}` is already registered")]
    DuplicateEntity(String),

    /// Malformed entity definition (duplicate columns, missing keys, ...).
    #[error("schema error: {0}")]
    Schema(String),

    /// An error inside a transaction; the transaction was rolled back.
    #[error("transaction aborted: {0}")]
    TransactionAborted(#[source] Box<Error>),

    /// A single-row lookup found nothing.
    #[error("record not found")]
    NotFound,

    /// An UPDATE or DELETE without any predicate was refused.
    #[error("refusing {0} without a WHERE clause")]
    MissingWhereClause(&'static str),

    /// Connection pool failure.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// A lifecycle hook rejected the operation.
    #[error("hook failed: {0}")]
    Hook(String),

    /// The database rejected a statement for a non-constraint reason.
    #[error("query error: {0}")]
    Query(String),

    /// Anything else.
    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Shorthand for a mapping error.
    pub fn mapping(msg: impl Into<String>) -> Self {
        Error::Mapping(msg.into())
    }

    /// Whether this is a constraint violation of any kind.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self.root(), Error::ConstraintViolation { .. })
    }

    /// Whether this is a duplicate key violation.
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self.root(),
            Error::ConstraintViolation {
                kind: ConstraintKind::Unique,
                ..
            }
        )
    }

    /// Whether the pool timed out waiting for a connection.
    pub fn is_pool_timeout(&self) -> bool {
        matches!(
            self.root(),
            Error::Pool(PoolError {
                kind: PoolErrorKind::Timeout,
                ..
            })
        )
    }

    /// The innermost error, looking through `TransactionAborted`.
    pub fn root(&self) -> &Error {
        match self {
            Error::TransactionAborted(inner) => inner.root(),
            other => other,
        }
    }
}
