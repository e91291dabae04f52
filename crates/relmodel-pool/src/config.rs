//! Pool configuration.

use std::time::Duration;

use relmodel_core::PoolError;
use serde::{Deserialize, Serialize};

/// Connection pool configuration.
///
/// Durations are (de)serialised as milliseconds:
///
/// ```json
/// { "max_open": 4, "max_idle": 1, "acquire_timeout_ms": 500 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of open connections (idle plus in use).
    pub max_open: usize,
    /// Maximum number of idle connections kept for reuse.
    pub max_idle: usize,
    /// Connections older than this are retired when returned or acquired.
    #[serde(rename = "max_lifetime_ms", with = "opt_millis")]
    pub max_lifetime: Option<Duration>,
    /// Idle connections unused for this long are closed.
    #[serde(rename = "max_idle_time_ms", with = "opt_millis")]
    pub max_idle_time: Option<Duration>,
    /// How long an acquire may block before failing.
    #[serde(rename = "acquire_timeout_ms", with = "millis")]
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_open: 10,
            max_idle: 2,
            max_lifetime: None,
            max_idle_time: None,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    /// Default configuration with `max_open` connections.
    pub fn new(max_open: usize) -> Self {
        Self::default().max_open(max_open)
    }

    /// Set the maximum number of open connections. `max_idle` is lowered to
    /// fit when it exceeds `n`.
    pub fn max_open(mut self, n: usize) -> Self {
        self.max_open = n;
        self.max_idle = self.max_idle.min(n);
        self
    }

    /// Set the maximum number of idle connections.
    pub fn max_idle(mut self, n: usize) -> Self {
        self.max_idle = n;
        self
    }

    /// Set the maximum connection lifetime.
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = Some(lifetime);
        self
    }

    /// Set the maximum idle time.
    pub fn max_idle_time(mut self, idle: Duration) -> Self {
        self.max_idle_time = Some(idle);
        self
    }

    /// Set the acquire timeout.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Check the configuration for values the pool cannot honour.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_open == 0 {
            return Err(PoolError::config("max_open must be at least 1"));
        }
        if self.max_idle > self.max_open {
            return Err(PoolError::config(format!(
                "max_idle ({}) exceeds max_open ({})",
                self.max_idle, self.max_open
            )));
        }
        Ok(())
    }
}

/// Serde adapter storing a `Duration` as integer milliseconds.
pub mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as milliseconds.
    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_millis() as u64)
    }

    /// Deserialize from milliseconds.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
    }
}
