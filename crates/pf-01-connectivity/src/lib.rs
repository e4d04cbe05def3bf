//! # Peer Connectivity Subsystem
//!
//! Connection lifecycle for a P2P node: discovery → deduplicated,
//! backoff-throttled connection attempts → liveness tracking.
//!
//! ## Architecture
//!
//! - **Domain Layer:** Backoff policy, LRU backoff cache, configuration
//! - **Queue:** Bounded, never-blocking [`ConnectQueue`]
//! - **Service Layer:** [`ConnectionTracker`], [`BackoffConnector`],
//!   [`DiscoveryBridge`], batch [`connect_peers`]
//!
//! ```text
//! DiscoveryBridge ──→ ConnectQueue ──→ BackoffConnector ──→ host.connect()
//!                                                              │
//!                         ConnectionTracker ←── HostEvent ─────┘
//! ```
//!
//! Every long-running loop takes a `CancellationToken`; cancelling the
//! node's root token stops all of them.

pub mod domain;
pub mod queue;
pub mod service;

pub use domain::*;
pub use queue::{connect_queue, ConnectQueue, ConnectQueueReceiver};
pub use service::*;
