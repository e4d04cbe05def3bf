//! # Error Types
//!
//! Errors reported by the capability ports. Subsystem crates wrap these in
//! their own error enums.

use thiserror::Error;

use crate::entities::{PeerId, ProtocolId};

/// Malformed textual peer identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerIdError {
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Invalid length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// Errors from the network host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The host was closed.
    #[error("Host closed")]
    Closed,

    /// Dialing our own peer id.
    #[error("Refusing to dial self")]
    SelfDial,

    /// Dial failed; the host now reports the peer as `CannotConnect`.
    #[error("Peer {0} unreachable")]
    Unreachable(PeerId),

    /// The remote peer has no handler for the requested protocol.
    #[error("Peer {peer} does not support protocol {protocol}")]
    ProtocolNotSupported { peer: PeerId, protocol: ProtocolId },

    /// Transport level failure.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Errors from the DHT router.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DhtError {
    #[error("DHT bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("DHT closed")]
    Closed,
}

/// Errors from the gossip engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PubSubEngineError {
    /// The subscription was cancelled; `next` will never yield again.
    #[error("Subscription cancelled")]
    SubscriptionCancelled,

    /// The topic handle was closed.
    #[error("Topic closed")]
    TopicClosed,

    /// The engine only allows one live handle per topic.
    #[error("Topic already joined: {0}")]
    TopicAlreadyJoined(String),

    #[error("Engine error: {0}")]
    Engine(String),
}

/// Errors from a discovery service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("Discovery service {service} failed to start: {reason}")]
    Start { service: String, reason: String },

    #[error("Discovery service closed")]
    Closed,
}
