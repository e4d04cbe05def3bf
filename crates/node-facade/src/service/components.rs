//! Capabilities a node is built from.

use pf_01_connectivity::{accept_all, OnPeerFound};
use shared_types::{DhtRouter, DiscoveryService, NetworkHost, PubSubEngine};
use std::sync::Arc;

use crate::domain::NodeConfig;

/// Networking stack handed to [`Node::new`](crate::Node::new).
#[derive(Clone)]
pub struct NodeComponents {
    pub host: Arc<dyn NetworkHost>,
    pub dht: Arc<dyn DhtRouter>,
    pub pubsub: Arc<dyn PubSubEngine>,
    /// Local broadcast discovery.
    pub discovery: Option<Arc<dyn DiscoveryService>>,
    pub extra_discovery: Vec<Arc<dyn DiscoveryService>>,
    /// Decides which discovered peers get dialed.
    pub on_peer_found: OnPeerFound,
}

impl NodeComponents {
    pub fn new(
        host: Arc<dyn NetworkHost>,
        dht: Arc<dyn DhtRouter>,
        pubsub: Arc<dyn PubSubEngine>,
    ) -> Self {
        Self {
            host,
            dht,
            pubsub,
            discovery: None,
            extra_discovery: Vec::new(),
            on_peer_found: accept_all(),
        }
    }

    #[must_use]
    pub fn with_discovery(mut self, service: Arc<dyn DiscoveryService>) -> Self {
        self.discovery = Some(service);
        self
    }

    #[must_use]
    pub fn with_extra_discovery(mut self, service: Arc<dyn DiscoveryService>) -> Self {
        self.extra_discovery.push(service);
        self
    }

    #[must_use]
    pub fn with_on_peer_found(mut self, on_peer_found: OnPeerFound) -> Self {
        self.on_peer_found = on_peer_found;
        self
    }
}

/// Config plus components: everything needed to build one node.
#[derive(Clone)]
pub struct NodeSpec {
    pub config: NodeConfig,
    pub components: NodeComponents,
}

impl NodeSpec {
    pub fn new(config: NodeConfig, components: NodeComponents) -> Self {
        Self { config, components }
    }
}
