//! Connectivity configuration.

use std::time::Duration;

use super::backoff::BackoffPolicy;

/// Connection tracker configuration
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Interval between garbage-collection sweeps
    pub gc_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            gc_interval: Duration::from_secs(15 * 60),
        }
    }
}

/// Backoff connector configuration
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Delay after the first failure
    pub backoff_low: Duration,
    /// Upper bound on any delay
    pub backoff_high: Duration,
    /// Growth factor between consecutive failures
    pub backoff_base: f64,
    /// Peers whose backoff clock is retained
    pub cache_size: usize,
    /// Per-attempt dial timeout
    pub connect_timeout: Duration,
    /// Capacity of the internal dial buffer and of the default connect queue
    pub queue_size: usize,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            backoff_low: Duration::from_secs(10),
            backoff_high: Duration::from_secs(30 * 60),
            backoff_base: 2.0,
            cache_size: 1024,
            connect_timeout: Duration::from_secs(60),
            queue_size: 32,
        }
    }
}

impl ConnectorConfig {
    #[must_use]
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            low: self.backoff_low,
            high: self.backoff_high,
            base: self.backoff_base,
        }
    }

    /// Short timeouts for tests against the in-memory network
    pub fn for_testing() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            ..Self::default()
        }
    }
}

/// Discovery bridge configuration
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Capacity of the channel discovery services push into
    pub channel_size: usize,
    /// Also dial every accepted peer directly, outside the connector
    pub direct_connect: bool,
    /// Timeout of that direct dial
    pub dial_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            channel_size: 64,
            direct_connect: true,
            dial_timeout: Duration::from_secs(60),
        }
    }
}
