use pf_01_connectivity::ConnectivityError;
use pf_02_pubsub::PubSubError;
use shared_types::{DhtError, HostError};
use std::time::Duration;
use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {error}")]
    Io { path: String, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Connectivity error: {0}")]
    Connectivity(#[from] ConnectivityError),

    #[error("PubSub error: {0}")]
    PubSub(#[from] PubSubError),

    #[error("DHT error: {0}")]
    Dht(#[from] DhtError),

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Node already started")]
    AlreadyStarted,

    #[error("Node closed")]
    Closed,

    /// Every component that failed to close, in close order.
    #[error("Node close failed: {}", .0.join("; "))]
    Close(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupError {
    #[error(transparent)]
    Node(#[from] NodeError),

    #[error("Group discovery timed out after {timeout:?} with {remaining} discoveries outstanding")]
    Timeout { timeout: Duration, remaining: usize },

    #[error("Last node knows {have} peers, expected at least {want}")]
    AddressBook { have: usize, want: usize },
}
