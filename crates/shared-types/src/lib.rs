//! # Shared Types Crate
//!
//! Peer identity, connectedness and the capability ports that every
//! P2P facade subsystem consumes.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: Types crossing a crate boundary live here.
//! - **Ports, not stacks**: Transport, DHT routing, gossip and local discovery
//!   are supplied from outside through the traits in [`ports`]. Subsystems
//!   only ever see `Arc<dyn Port>`.
//! - **Identity by peer**: A [`PeerAddress`] compares and hashes by its
//!   [`PeerId`] alone, so a peer rediscovered with different addresses is
//!   still the same peer.

pub mod entities;
pub mod errors;
pub mod ports;

pub use entities::*;
pub use errors::*;
pub use ports::*;
