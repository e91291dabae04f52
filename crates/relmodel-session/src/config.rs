//! Database configuration.

use std::path::Path;
use std::time::Duration;

use relmodel_core::{Error, Result};
use relmodel_pool::PoolConfig;
use relmodel_query::Dialect;
use serde::{Deserialize, Serialize};

/// Configuration of a [`Database`](crate::Database).
///
/// ```json
/// {
///   "dialect": "sqlite",
///   "pool": { "max_open": 4, "acquire_timeout_ms": 2000 },
///   "skip_default_transaction": false,
///   "slow_threshold_ms": 100,
///   "track_statements": true
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQL dialect statements are rendered in.
    pub dialect: Dialect,
    /// Connection pool settings.
    pub pool: PoolConfig,
    /// Run single writes without wrapping them in a transaction.
    pub skip_default_transaction: bool,
    /// Statements slower than this are logged at `warn`.
    #[serde(rename = "slow_threshold_ms", with = "relmodel_pool::config::millis")]
    pub slow_threshold: Duration,
    /// Keep a log of every statement in a [`StatementTracker`](crate::StatementTracker).
    pub track_statements: bool,
    /// Rows per INSERT issued by `create_many`.
    pub create_batch_size: usize,
    /// Association loads per (entity, relation) before a repeated-load warning.
    pub lazy_load_threshold: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            pool: PoolConfig::default(),
            skip_default_transaction: false,
            slow_threshold: Duration::from_millis(200),
            track_statements: false,
            create_batch_size: 100,
            lazy_load_threshold: 3,
        }
    }
}

impl DatabaseConfig {
    /// Default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the dialect.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Set the pool configuration.
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Disable the implicit transaction around single writes.
    pub fn skip_default_transaction(mut self, value: bool) -> Self {
        self.skip_default_transaction = value;
        self
    }

    /// Set the slow statement threshold.
    pub fn slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    /// Enable or disable the statement tracker.
    pub fn track_statements(mut self, value: bool) -> Self {
        self.track_statements = value;
        self
    }

    /// Set the `create_many` batch size.
    pub fn create_batch_size(mut self, size: usize) -> Self {
        self.create_batch_size = size;
        self
    }

    /// Set the repeated association load warning threshold.
    pub fn lazy_load_threshold(mut self, threshold: usize) -> Self {
        self.lazy_load_threshold = threshold;
        self
    }

    /// Parse a JSON document. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Custom(format!("invalid database config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Custom(format!("cannot read database config {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Check for values the engine cannot honour.
    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;
        if self.create_batch_size == 0 {
            return Err(Error::Custom(
                "create_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
