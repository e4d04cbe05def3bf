//! # Discovery Bridge
//!
//! Turns peer-found notifications from any number of discovery services into
//! connect-queue entries.
//!
//! ## Architecture
//!
//! ```text
//! primary (local broadcast) ─┐
//! extra services ────────────┼─try_send─→ found channel ─→ [consumer loop]
//!                            ┘                                │
//!                                          on_peer_found(addr)?
//!                                          ├─→ ConnectQueue::push
//!                                          └─→ spawn host.connect (logged)
//! ```
//!
//! Services deliver at-least-once; duplicates are harmless because the
//! queue, the connector and the host all tolerate repeated addresses.

use facade_telemetry::{metric_inc, DISCOVERY_PEERS_FOUND};
use shared_types::{DiscoveryService, NetworkHost, PeerAddress};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{ConnectivityError, DiscoveryConfig};
use crate::queue::ConnectQueue;

/// Caller-supplied filter deciding whether a discovered peer is dialed.
pub type OnPeerFound = Arc<dyn Fn(&PeerAddress) -> bool + Send + Sync>;

/// Predicate accepting every peer.
pub fn accept_all() -> OnPeerFound {
    Arc::new(|_: &PeerAddress| true)
}

pub struct DiscoveryBridge {
    host: Arc<dyn NetworkHost>,
    queue: ConnectQueue,
    on_peer_found: OnPeerFound,
    primary: Option<Arc<dyn DiscoveryService>>,
    services: Vec<Arc<dyn DiscoveryService>>,
    config: DiscoveryConfig,
}

impl DiscoveryBridge {
    pub fn new(host: Arc<dyn NetworkHost>, queue: ConnectQueue, config: DiscoveryConfig) -> Self {
        Self {
            host,
            queue,
            on_peer_found: accept_all(),
            primary: None,
            services: Vec::new(),
            config,
        }
    }

    #[must_use]
    pub fn with_on_peer_found(mut self, on_peer_found: OnPeerFound) -> Self {
        self.on_peer_found = on_peer_found;
        self
    }

    /// The local broadcast service. Its start failure is fatal only when no
    /// other service is registered.
    #[must_use]
    pub fn with_primary(mut self, service: Arc<dyn DiscoveryService>) -> Self {
        self.primary = Some(service);
        self
    }

    #[must_use]
    pub fn with_service(mut self, service: Arc<dyn DiscoveryService>) -> Self {
        self.services.push(service);
        self
    }

    /// Start every service and spawn the consumer loop.
    pub async fn start(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>, ConnectivityError> {
        let (found_tx, found_rx) = mpsc::channel(self.config.channel_size.max(1));

        if let Some(primary) = &self.primary {
            if let Err(e) = primary.start(found_tx.clone()).await {
                if self.services.is_empty() {
                    return Err(ConnectivityError::DiscoverySetup(e));
                }
                warn!(service = primary.name(), error = %e, "Primary discovery failed, continuing with others");
            }
        }

        for service in &self.services {
            match service.start(found_tx.clone()).await {
                Ok(()) => info!(service = service.name(), "Discovery service started"),
                Err(e) => warn!(service = service.name(), error = %e, "Discovery service failed to start"),
            }
        }
        drop(found_tx);

        let bridge = Arc::clone(self);
        Ok(tokio::spawn(async move {
            bridge.consume(found_rx, cancel).await;
        }))
    }

    async fn consume(&self, mut found: mpsc::Receiver<PeerAddress>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = found.recv() => match next {
                    Some(addr) => self.handle_peer_found(addr),
                    None => break,
                },
            }
        }
        debug!("Discovery bridge stopped");
    }

    /// Apply the predicate and hand an accepted peer to the queue and host.
    pub fn handle_peer_found(&self, addr: PeerAddress) {
        if addr.peer_id() == self.host.local_peer_id() {
            return;
        }
        if !(self.on_peer_found)(&addr) {
            metric_inc!(DISCOVERY_PEERS_FOUND, &["rejected"]);
            debug!(peer = %addr.peer_id(), "Discovered peer rejected");
            return;
        }
        metric_inc!(DISCOVERY_PEERS_FOUND, &["accepted"]);
        debug!(peer = %addr, "Discovered peer");

        self.queue.push(addr.clone());

        if self.config.direct_connect {
            let host = Arc::clone(&self.host);
            let dial_timeout = self.config.dial_timeout;
            tokio::spawn(async move {
                match timeout(dial_timeout, host.connect(&addr)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(peer = %addr.peer_id(), error = %e, "Failed to connect to discovered peer"),
                    Err(_) => warn!(peer = %addr.peer_id(), "Timed out connecting to discovered peer"),
                }
            });
        }
    }

    /// Stop every registered service, returning the first error.
    pub async fn close(&self) -> Result<(), ConnectivityError> {
        let mut first_error = None;
        for service in self.primary.iter().chain(self.services.iter()) {
            if let Err(e) = service.close().await {
                warn!(service = service.name(), error = %e, "Failed to close discovery service");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(ConnectivityError::DiscoveryClose(e)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::connect_queue;
    use mem_network::{FailingDiscovery, MemoryNetwork};
    use shared_types::PeerId;
    use std::time::Duration;

    #[tokio::test]
    async fn test_accepted_peer_is_queued_and_dialed() {
        let network = MemoryNetwork::new();
        let a = network.add_host();
        let b = network.add_host();
        let (queue, mut rx) = connect_queue(8);
        let bridge = DiscoveryBridge::new(a.clone(), queue, DiscoveryConfig::default());

        bridge.handle_peer_found(b.local_address());

        let queued = rx.recv().await.unwrap();
        assert_eq!(queued.peer_id(), b.local_peer_id());
        tokio::time::timeout(Duration::from_secs(2), async {
            while !a.connectedness(&b.local_peer_id()).is_connected() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timeout");
    }

    #[tokio::test]
    async fn test_predicate_filters_and_self_is_ignored() {
        let network = MemoryNetwork::new();
        let a = network.add_host();
        let allowed = PeerId::from_byte(1);
        let (queue, rx) = connect_queue(8);
        let config = DiscoveryConfig {
            direct_connect: false,
            ..DiscoveryConfig::default()
        };
        let bridge = DiscoveryBridge::new(a.clone(), queue, config)
            .with_on_peer_found(Arc::new(move |addr: &PeerAddress| addr.peer_id() == allowed));

        bridge.handle_peer_found(PeerAddress::new(allowed, vec![]));
        bridge.handle_peer_found(PeerAddress::new(PeerId::from_byte(2), vec![]));
        bridge.handle_peer_found(a.local_address());

        assert_eq!(rx.len(), 1);
    }

    #[tokio::test]
    async fn test_primary_failure_fatal_without_fallback() {
        let network = MemoryNetwork::new();
        let a = network.add_host();
        let (queue, _rx) = connect_queue(8);
        let bridge = Arc::new(
            DiscoveryBridge::new(a.clone(), queue, DiscoveryConfig::default())
                .with_primary(Arc::new(FailingDiscovery::new("mdns"))),
        );

        let err = bridge.start(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ConnectivityError::DiscoverySetup(_)));
    }

    #[tokio::test]
    async fn test_primary_failure_tolerated_with_fallback() {
        let network = MemoryNetwork::new();
        let a = network.add_host();
        let b = network.add_host();
        let (queue, mut rx) = connect_queue(8);
        let fallback = network.discovery("fallback", &b);
        let bridge = Arc::new(
            DiscoveryBridge::new(a.clone(), queue, DiscoveryConfig::default())
                .with_primary(Arc::new(FailingDiscovery::new("mdns")))
                .with_service(network.discovery("fallback", &a)),
        );
        let cancel = CancellationToken::new();

        let _handle = bridge.start(cancel.clone()).await.unwrap();
        fallback.start(mpsc::channel(8).0).await.unwrap();

        let queued = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timeout")
            .unwrap();
        assert_eq!(queued.peer_id(), b.local_peer_id());
        cancel.cancel();
    }
}
