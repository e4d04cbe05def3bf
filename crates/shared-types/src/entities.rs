//! # Core Entities
//!
//! Identity and state types shared by the connectivity, pubsub and stream
//! subsystems.
//!
//! ## Clusters
//!
//! - **Identity**: `PeerId`, `PeerAddress`, `ProtocolId`
//! - **Liveness**: `Connectedness`, `HostEvent`
//! - **Messaging**: `PubSubMessage`

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::errors::PeerIdError;

// =============================================================================
// IDENTITY
// =============================================================================

/// Unique identifier for a peer in the network.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct PeerId(pub [u8; 32]);

impl PeerId {
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate a random identifier. Used for ephemeral local peers.
    #[must_use]
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Deterministic identifier with the given byte repeated. Handy in tests.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        Self([byte; 32])
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First four bytes as hex, for log lines.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.short())
    }
}

impl FromStr for PeerId {
    type Err = PeerIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| PeerIdError::InvalidHex(e.to_string()))?;
        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| PeerIdError::InvalidLength(bytes.len()))?;
        Ok(Self(array))
    }
}

/// A peer identifier plus the ordered endpoints it can be reached on.
///
/// Immutable once discovered. Equality and hashing only look at the peer id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerAddress {
    peer_id: PeerId,
    addrs: Vec<String>,
}

impl PeerAddress {
    #[must_use]
    pub fn new(peer_id: PeerId, addrs: Vec<String>) -> Self {
        Self { peer_id, addrs }
    }

    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    #[must_use]
    pub fn addrs(&self) -> &[String] {
        &self.addrs
    }
}

impl PartialEq for PeerAddress {
    fn eq(&self, other: &Self) -> bool {
        self.peer_id == other.peer_id
    }
}

impl Eq for PeerAddress {}

impl Hash for PeerAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.peer_id.hash(state);
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@[{}]", self.peer_id.short(), self.addrs.join(","))
    }
}

/// Stream protocol identifier, e.g. `/pf/echo/1.0.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProtocolId(String);

impl ProtocolId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProtocolId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// LIVENESS
// =============================================================================

/// Host-reported state of the relationship with a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Connectedness {
    /// No live connection.
    #[default]
    NotConnected,
    /// At least one live connection.
    Connected,
    /// The last dial failed; the peer is considered unreachable.
    CannotConnect,
    /// The host has no opinion.
    Unknown,
}

impl Connectedness {
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// `NotConnected` or `CannotConnect`: the states that retire a tracked peer.
    #[must_use]
    pub fn is_gone(self) -> bool {
        matches!(self, Self::NotConnected | Self::CannotConnect)
    }
}

impl fmt::Display for Connectedness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotConnected => "not_connected",
            Self::Connected => "connected",
            Self::CannotConnect => "cannot_connect",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Connection lifecycle event published by the network host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    Connected(PeerId),
    Disconnected(PeerId),
}

impl HostEvent {
    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        match self {
            Self::Connected(id) | Self::Disconnected(id) => *id,
        }
    }
}

// =============================================================================
// MESSAGING
// =============================================================================

/// A message delivered by the pubsub engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubSubMessage {
    pub topic: String,
    pub from: PeerId,
    /// Per-publisher sequence number, monotonically increasing.
    pub seqno: u64,
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_peer_id_hex_roundtrip() {
        let id = PeerId::random();
        let parsed: PeerId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_peer_id_rejects_bad_input() {
        assert!(matches!("zz".parse::<PeerId>(), Err(PeerIdError::InvalidHex(_))));
        assert!(matches!(
            "abcd".parse::<PeerId>(),
            Err(PeerIdError::InvalidLength(2))
        ));
    }

    #[test]
    fn test_peer_address_dedups_by_peer_id() {
        let id = PeerId::from_byte(7);
        let a = PeerAddress::new(id, vec!["/memory/1".into()]);
        let b = PeerAddress::new(id, vec!["/memory/2".into(), "/memory/3".into()]);

        let set: HashSet<_> = [a.clone(), b].into_iter().collect();
        assert_eq!(set.len(), 1);
        assert_eq!(set.into_iter().next().unwrap().addrs(), a.addrs());
    }

    #[test]
    fn test_connectedness_gone_states() {
        assert!(Connectedness::NotConnected.is_gone());
        assert!(Connectedness::CannotConnect.is_gone());
        assert!(!Connectedness::Connected.is_gone());
        assert!(!Connectedness::Unknown.is_gone());
    }

    #[test]
    fn test_peer_address_serde() {
        let addr = PeerAddress::new(PeerId::from_byte(1), vec!["/memory/9".into()]);
        let json = serde_json::to_string(&addr).unwrap();
        let back: PeerAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back.addrs(), addr.addrs());
    }
}
