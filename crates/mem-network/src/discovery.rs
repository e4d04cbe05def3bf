//! Local broadcast discovery over the network hub.
//!
//! Members sharing a service tag are introduced to each other when one of
//! them starts, and again on every re-announce tick. Delivery is
//! at-least-once: re-announces and the duplicate knob both repeat peers.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{DiscoveryError, DiscoveryService, PeerAddress};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::network::MemoryNetwork;

pub struct MemoryDiscovery {
    name: String,
    tag: String,
    address: PeerAddress,
    network: MemoryNetwork,
    interval: Option<Duration>,
    running: Mutex<Option<CancellationToken>>,
}

impl MemoryDiscovery {
    pub(crate) fn new(
        tag: &str,
        address: PeerAddress,
        network: MemoryNetwork,
        interval: Option<Duration>,
    ) -> Self {
        Self {
            name: format!("memory-mdns:{tag}"),
            tag: tag.to_string(),
            address,
            network,
            interval,
            running: Mutex::new(None),
        }
    }

    /// Re-introduce this member to everyone under the same tag.
    pub fn announce(&self) {
        self.network.announce(&self.tag, &self.address.peer_id());
    }
}

#[async_trait]
impl DiscoveryService for MemoryDiscovery {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, found: mpsc::Sender<PeerAddress>) -> Result<(), DiscoveryError> {
        self.network
            .join_discovery(&self.tag, self.address.clone(), found);
        self.announce();

        if let Some(interval) = self.interval {
            let token = CancellationToken::new();
            if let Some(previous) = self.running.lock().replace(token.clone()) {
                previous.cancel();
            }
            let network = self.network.clone();
            let tag = self.tag.clone();
            let peer = self.address.peer_id();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => network.announce(&tag, &peer),
                    }
                }
            });
        }

        debug!(service = %self.name, peer = %self.address.peer_id().short(), "Memory discovery started");
        Ok(())
    }

    async fn close(&self) -> Result<(), DiscoveryError> {
        if let Some(token) = self.running.lock().take() {
            token.cancel();
        }
        self.network
            .leave_discovery(&self.tag, &self.address.peer_id());
        Ok(())
    }
}

/// A discovery service that always fails to start.
pub struct FailingDiscovery {
    name: String,
}

impl FailingDiscovery {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl DiscoveryService for FailingDiscovery {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, _found: mpsc::Sender<PeerAddress>) -> Result<(), DiscoveryError> {
        Err(DiscoveryError::Start {
            service: self.name.clone(),
            reason: "simulated failure".to_string(),
        })
    }

    async fn close(&self) -> Result<(), DiscoveryError> {
        Ok(())
    }
}
