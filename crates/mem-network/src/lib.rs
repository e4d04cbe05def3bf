//! # In-Memory Network Stack
//!
//! In-process implementations of the capability ports in `shared-types`:
//!
//! | Port | Implementation |
//! |------|----------------|
//! | `NetworkHost` | [`MemoryHost`]: symmetric links, duplex streams |
//! | `DhtRouter` | [`MemoryDht`]: counts bootstraps |
//! | `PubSubEngine` | [`MemoryPubSub`]: one broadcast channel per topic |
//! | `DiscoveryService` | [`MemoryDiscovery`]: per-tag introduction hub |
//!
//! All of them hang off a [`MemoryNetwork`] hub, which also exposes the
//! knobs tests use: dial delay, unreachable peers, dial statistics, blocked
//! or duplicated discovery.
//!
//! ```rust,ignore
//! let network = MemoryNetwork::new();
//! let a = network.add_host();
//! let b = network.add_host();
//! a.connect(&b.local_address()).await?;
//! ```

mod dht;
mod discovery;
mod host;
mod network;
mod pubsub;

pub use dht::MemoryDht;
pub use discovery::{FailingDiscovery, MemoryDiscovery};
pub use host::MemoryHost;
pub use network::{DialStats, MemoryNetwork, DEFAULT_UNREACHABLE_TTL};
pub use pubsub::{MemoryPubSub, MemorySubscription, MemoryTopic};
