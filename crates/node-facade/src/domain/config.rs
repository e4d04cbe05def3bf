//! # Node Configuration
//!
//! File-level configuration of a node. Every section is optional; missing
//! fields take their defaults.
//!
//! ```toml
//! user_agent = "pnet/0.1"
//! mdns_service_tag = "pnet:pubsub"
//!
//! [connector]
//! backoff_low_secs = 10
//! backoff_high_secs = 1800
//! queue_size = 32
//!
//! [pubsub]
//! default_buffer_size = 32
//!
//! [[pubsub.topics]]
//! name = "^blocks"
//! buffer_size = 128
//!
//! [streams]
//! timeout_secs = 15
//! ```

use pf_01_connectivity::{ConnectorConfig, DiscoveryConfig, TrackerConfig};
use pf_02_pubsub::PubSubConfig;
use pf_03_streams::{StreamConfig, DEFAULT_MAX_FRAME_LEN};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::domain::errors::ConfigError;

pub const DEFAULT_MDNS_SERVICE_TAG: &str = "pnet:pubsub";

/// Upper bound for every `*_secs` setting (one year). Larger values overflow
/// deadline arithmetic.
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Handed to the transport. The in-memory stack assigns its own.
    pub listen_addrs: Vec<String>,
    pub user_agent: String,
    /// Local broadcast discovery tag; `None` disables it.
    pub mdns_service_tag: Option<String>,
    /// Timeout of the direct dial made for every discovered peer.
    pub dial_timeout_secs: u64,
    pub tracker: TrackerSection,
    pub connector: ConnectorSection,
    pub discovery: DiscoverySection,
    pub pubsub: PubSubConfig,
    pub streams: StreamsSection,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addrs: Vec::new(),
            user_agent: "pnet".to_string(),
            mdns_service_tag: Some(DEFAULT_MDNS_SERVICE_TAG.to_string()),
            dial_timeout_secs: 60,
            tracker: TrackerSection::default(),
            connector: ConnectorSection::default(),
            discovery: DiscoverySection::default(),
            pubsub: PubSubConfig::default(),
            streams: StreamsSection::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSection {
    pub gc_interval_secs: u64,
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            gc_interval_secs: 15 * 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorSection {
    pub backoff_low_secs: u64,
    pub backoff_high_secs: u64,
    pub backoff_base: f64,
    pub cache_size: usize,
    pub connect_timeout_secs: u64,
    pub queue_size: usize,
}

impl Default for ConnectorSection {
    fn default() -> Self {
        Self {
            backoff_low_secs: 10,
            backoff_high_secs: 30 * 60,
            backoff_base: 2.0,
            cache_size: 1024,
            connect_timeout_secs: 60,
            queue_size: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    /// Re-announce period of local broadcast discovery.
    pub interval_secs: u64,
    pub channel_size: usize,
    pub direct_connect: bool,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            interval_secs: 600,
            channel_size: 64,
            direct_connect: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamsSection {
    pub timeout_secs: u64,
    pub max_frame_len: usize,
}

impl Default for StreamsSection {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl NodeConfig {
    /// Load from a `.toml` or `.json` file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => Self::from_json_str(&content),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the subsystems cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.connector;
        let durations = [
            ("connector.backoff_low_secs", c.backoff_low_secs),
            ("connector.backoff_high_secs", c.backoff_high_secs),
            ("connector.connect_timeout_secs", c.connect_timeout_secs),
            ("tracker.gc_interval_secs", self.tracker.gc_interval_secs),
            ("discovery.interval_secs", self.discovery.interval_secs),
            ("dial_timeout_secs", self.dial_timeout_secs),
            ("streams.timeout_secs", self.streams.timeout_secs),
            ("pubsub.publish_timeout_secs", self.pubsub.publish_timeout_secs),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, secs)| *secs > MAX_DURATION_SECS) {
            return Err(ConfigError::Invalid(format!(
                "{name} exceeds {MAX_DURATION_SECS} seconds"
            )));
        }

        let checks = [
            (c.queue_size == 0, "connector.queue_size must be positive"),
            (c.cache_size == 0, "connector.cache_size must be positive"),
            (c.connect_timeout_secs == 0, "connector.connect_timeout_secs must be positive"),
            (c.backoff_low_secs == 0, "connector.backoff_low_secs must be positive"),
            (
                !c.backoff_base.is_finite() || c.backoff_base < 1.0,
                "connector.backoff_base must be a finite number of at least 1.0",
            ),
            (
                c.backoff_low_secs > c.backoff_high_secs,
                "connector.backoff_low_secs exceeds backoff_high_secs",
            ),
            (self.tracker.gc_interval_secs == 0, "tracker.gc_interval_secs must be positive"),
            (self.discovery.channel_size == 0, "discovery.channel_size must be positive"),
            (self.discovery.interval_secs == 0, "discovery.interval_secs must be positive"),
            (self.dial_timeout_secs == 0, "dial_timeout_secs must be positive"),
            (self.streams.timeout_secs == 0, "streams.timeout_secs must be positive"),
            (self.streams.max_frame_len == 0, "streams.max_frame_len must be positive"),
            (self.pubsub.default_buffer_size == 0, "pubsub.default_buffer_size must be positive"),
            (self.pubsub.publish_timeout_secs == 0, "pubsub.publish_timeout_secs must be positive"),
        ];

        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, reason)) => Err(ConfigError::Invalid((*reason).to_string())),
            None => Ok(()),
        }
    }

    /// Short timeouts and fast re-announce for local clusters and tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            dial_timeout_secs: 2,
            connector: ConnectorSection {
                connect_timeout_secs: 2,
                ..ConnectorSection::default()
            },
            discovery: DiscoverySection {
                interval_secs: 1,
                ..DiscoverySection::default()
            },
            pubsub: PubSubConfig::for_testing(),
            streams: StreamsSection {
                timeout_secs: 2,
                ..StreamsSection::default()
            },
            ..Self::default()
        }
    }

    // =========================================================================
    // SUBSYSTEM VIEWS
    // =========================================================================

    #[must_use]
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            gc_interval: Duration::from_secs(self.tracker.gc_interval_secs),
        }
    }

    #[must_use]
    pub fn connector_config(&self) -> ConnectorConfig {
        let c = &self.connector;
        ConnectorConfig {
            backoff_low: Duration::from_secs(c.backoff_low_secs),
            backoff_high: Duration::from_secs(c.backoff_high_secs),
            backoff_base: c.backoff_base,
            cache_size: c.cache_size,
            connect_timeout: Duration::from_secs(c.connect_timeout_secs),
            queue_size: c.queue_size,
        }
    }

    #[must_use]
    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            channel_size: self.discovery.channel_size,
            direct_connect: self.discovery.direct_connect,
            dial_timeout: Duration::from_secs(self.dial_timeout_secs),
        }
    }

    #[must_use]
    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery.interval_secs)
    }

    #[must_use]
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            timeout: Duration::from_secs(self.streams.timeout_secs),
            max_frame_len: self.streams.max_frame_len,
        }
    }
}
