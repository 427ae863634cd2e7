//! Pool configuration.

use docbatch_core::{ConfigError, Error};
use std::time::Duration;

/// Connection pool configuration.
///
/// The defaults size the pool for a single-tenant worker that serves one
/// request at a time: one connection, opened lazily, kept for two minutes
/// of idleness.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Minimum number of connections to maintain
    pub min_connections: usize,
    /// Maximum number of connections allowed
    pub max_connections: usize,
    /// Connection idle timeout in milliseconds (0 disables)
    pub idle_timeout_ms: u64,
    /// Maximum time to wait for a connection in milliseconds (0 waits forever)
    pub acquire_timeout_ms: u64,
    /// Maximum lifetime of a connection in milliseconds (0 disables)
    pub max_lifetime_ms: u64,
    /// Test connections before giving them out
    pub test_on_checkout: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 0,
            max_connections: 1,
            idle_timeout_ms: 120_000,   // 2 minutes
            acquire_timeout_ms: 10_000, // 10 seconds
            max_lifetime_ms: 1_800_000, // 30 minutes
            test_on_checkout: false,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with the given max connections.
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            ..Default::default()
        }
    }

    /// Set minimum connections.
    pub fn min_connections(mut self, n: usize) -> Self {
        self.min_connections = n;
        self
    }

    /// Set idle timeout.
    pub fn idle_timeout(mut self, ms: u64) -> Self {
        self.idle_timeout_ms = ms;
        self
    }

    /// Set acquire timeout.
    pub fn acquire_timeout(mut self, ms: u64) -> Self {
        self.acquire_timeout_ms = ms;
        self
    }

    /// Set max lifetime.
    pub fn max_lifetime(mut self, ms: u64) -> Self {
        self.max_lifetime_ms = ms;
        self
    }

    /// Enable/disable test on checkout.
    pub fn test_on_checkout(mut self, enabled: bool) -> Self {
        self.test_on_checkout = enabled;
        self
    }

    /// Reject configurations the pool cannot honor.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_connections == 0 {
            return Err(config_error("max_connections must be at least 1"));
        }
        if self.min_connections > self.max_connections {
            return Err(config_error(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        Ok(())
    }

    pub(crate) fn idle_timeout_duration(&self) -> Option<Duration> {
        non_zero_millis(self.idle_timeout_ms)
    }

    pub(crate) fn acquire_timeout_duration(&self) -> Option<Duration> {
        non_zero_millis(self.acquire_timeout_ms)
    }

    pub(crate) fn max_lifetime_duration(&self) -> Option<Duration> {
        non_zero_millis(self.max_lifetime_ms)
    }
}

fn non_zero_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

fn config_error(message: impl Into<String>) -> Error {
    Error::Config(ConfigError {
        message: message.into(),
        source: None,
    })
}
