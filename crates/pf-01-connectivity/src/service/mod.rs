//! Service Layer - Async loops wiring the domain to the host ports.

mod batch;
mod connector;
mod discovery;
mod tracker;

pub use batch::{connect_peers, wait_for_peers};
pub use connector::{BackoffConnector, ConnectorHandle};
pub use discovery::{accept_all, DiscoveryBridge, OnPeerFound};
pub use tracker::ConnectionTracker;
