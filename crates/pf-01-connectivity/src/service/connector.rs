//! # Backoff Connector
//!
//! Drains a [`ConnectQueueReceiver`] and dials each peer through the host,
//! throttled by a per-peer exponential backoff.
//!
//! ## Architecture
//!
//! ```text
//! ConnectQueue ──→ [forward loop] ──try_send──→ dial buffer ──→ [dial loop]
//!                   skip Connected /                             │ BackoffCache
//!                   CannotConnect                                ↓
//!                                                      spawn: host.connect()
//!                                                      under connect_timeout
//! ```
//!
//! Both loops share one cancellation token. Each dial runs in its own task
//! so an unreachable peer only ever costs one `connect_timeout`, and the
//! cache's in-flight flag keeps a peer from being dialed twice at once.

use facade_telemetry::{metric_inc, CONNECTOR_SKIPPED, CONNECT_ATTEMPTS};
use parking_lot::Mutex;
use shared_types::{Connectedness, NetworkHost, PeerAddress, PeerId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::{BackoffCache, BackoffState, ConnectorConfig, DialDecision};
use crate::queue::ConnectQueueReceiver;

/// Dials queued peers with per-peer exponential backoff.
pub struct BackoffConnector {
    host: Arc<dyn NetworkHost>,
    config: ConnectorConfig,
    cache: Mutex<BackoffCache>,
}

/// Join handles of the two connector loops.
pub struct ConnectorHandle {
    pub forward: JoinHandle<()>,
    pub dial: JoinHandle<()>,
}

impl ConnectorHandle {
    /// Wait for both loops to exit.
    pub async fn join(self) {
        let _ = self.forward.await;
        let _ = self.dial.await;
    }
}

impl BackoffConnector {
    pub fn new(host: Arc<dyn NetworkHost>, config: ConnectorConfig) -> Self {
        let cache = BackoffCache::from_config(&config);
        Self {
            host,
            config,
            cache: Mutex::new(cache),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Spawn the forwarding and dialing loops.
    pub fn start(
        self: &Arc<Self>,
        queue: ConnectQueueReceiver,
        cancel: CancellationToken,
    ) -> ConnectorHandle {
        let (buffer_tx, buffer_rx) = mpsc::channel(self.config.queue_size.max(1));

        let forward = tokio::spawn(Arc::clone(self).forward_loop(queue, buffer_tx, cancel.clone()));
        let dial = tokio::spawn(Arc::clone(self).dial_loop(buffer_rx, cancel));

        ConnectorHandle { forward, dial }
    }

    async fn forward_loop(
        self: Arc<Self>,
        mut queue: ConnectQueueReceiver,
        buffer: mpsc::Sender<PeerAddress>,
        cancel: CancellationToken,
    ) {
        loop {
            let addr = tokio::select! {
                _ = cancel.cancelled() => break,
                next = queue.recv() => match next {
                    Some(addr) => addr,
                    None => break,
                },
            };

            let peer = addr.peer_id();
            match self.host.connectedness(&peer) {
                Connectedness::Connected => {
                    metric_inc!(CONNECTOR_SKIPPED, &["connected"]);
                    continue;
                }
                Connectedness::CannotConnect => {
                    metric_inc!(CONNECTOR_SKIPPED, &["unreachable"]);
                    continue;
                }
                Connectedness::NotConnected | Connectedness::Unknown => {}
            }

            match buffer.try_send(addr) {
                Ok(()) => {}
                Err(TrySendError::Full(addr)) => {
                    metric_inc!(CONNECTOR_SKIPPED, &["buffer_full"]);
                    warn!(peer = %addr.peer_id(), "Dial buffer full, dropping peer");
                }
                Err(TrySendError::Closed(_)) => break,
            }
        }
        debug!("Connector forward loop stopped");
    }

    async fn dial_loop(
        self: Arc<Self>,
        mut buffer: mpsc::Receiver<PeerAddress>,
        cancel: CancellationToken,
    ) {
        loop {
            let addr = tokio::select! {
                _ = cancel.cancelled() => break,
                next = buffer.recv() => match next {
                    Some(addr) => addr,
                    None => break,
                },
            };

            let decision = self
                .cache
                .lock()
                .begin_attempt(addr.peer_id(), Instant::now().into_std());

            match decision {
                DialDecision::Dial => {
                    tokio::spawn(Arc::clone(&self).dial(addr, cancel.child_token()));
                }
                DialDecision::InFlight => {
                    metric_inc!(CONNECTOR_SKIPPED, &["in_flight"]);
                    debug!(peer = %addr.peer_id(), "Dial already in flight");
                }
                DialDecision::BackingOff { remaining } => {
                    metric_inc!(CONNECTOR_SKIPPED, &["backoff"]);
                    debug!(peer = %addr.peer_id(), ?remaining, "Peer backing off");
                }
            }
        }
        debug!("Connector dial loop stopped");
    }

    async fn dial(self: Arc<Self>, addr: PeerAddress, cancel: CancellationToken) {
        let peer = addr.peer_id();

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                self.cache.lock().abandon(&peer);
                return;
            }
            outcome = timeout(self.config.connect_timeout, self.host.connect(&addr)) => outcome,
        };

        match outcome {
            Ok(Ok(())) => {
                self.cache.lock().record_success(&peer);
                metric_inc!(CONNECT_ATTEMPTS, &["success"]);
                debug!(peer = %peer, "Connected");
            }
            Ok(Err(e)) => {
                let delay = self.cache.lock().record_failure(peer, Instant::now().into_std());
                metric_inc!(CONNECT_ATTEMPTS, &["failed"]);
                debug!(peer = %peer, error = %e, ?delay, "Dial failed, backing off");
            }
            Err(_) => {
                let delay = self.cache.lock().record_failure(peer, Instant::now().into_std());
                metric_inc!(CONNECT_ATTEMPTS, &["timeout"]);
                debug!(peer = %peer, ?delay, "Dial timed out, backing off");
            }
        }
    }

    /// Snapshot of a peer's backoff clock.
    #[must_use]
    pub fn backoff_state(&self, peer: &PeerId) -> Option<BackoffState> {
        self.cache.lock().state(peer).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::connect_queue;
    use mem_network::MemoryNetwork;
    use std::time::Duration;

    #[tokio::test]
    async fn test_connects_queued_peer() {
        let network = MemoryNetwork::new();
        let a = network.add_host();
        let b = network.add_host();
        let connector = Arc::new(BackoffConnector::new(a.clone(), ConnectorConfig::for_testing()));
        let (queue, rx) = connect_queue(8);
        let cancel = CancellationToken::new();
        let handle = connector.start(rx, cancel.clone());

        queue.push(b.local_address());

        tokio::time::timeout(Duration::from_secs(2), async {
            while !a.connectedness(&b.local_peer_id()).is_connected() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timeout");

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle.join())
            .await
            .expect("timeout");
    }

    #[tokio::test]
    async fn test_duplicate_entries_never_dial_concurrently() {
        let network = MemoryNetwork::new();
        network.set_dial_delay(Duration::from_millis(200));
        let a = network.add_host();
        let b = network.add_host();
        let connector = Arc::new(BackoffConnector::new(a.clone(), ConnectorConfig::for_testing()));
        let (queue, rx) = connect_queue(8);
        let cancel = CancellationToken::new();
        let _handle = connector.start(rx, cancel.clone());

        for _ in 0..4 {
            queue.push(b.local_address());
        }
        tokio::time::sleep(Duration::from_millis(400)).await;

        let stats = network.dial_stats(&b.local_peer_id());
        assert_eq!(stats.max_concurrent, 1);
        assert!(a.connectedness(&b.local_peer_id()).is_connected());
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_peer_waits_out_backoff() {
        let network = MemoryNetwork::new();
        network.set_unreachable_ttl(Duration::from_millis(20));
        let a = network.add_host();
        let b = network.add_host();
        network.set_unreachable(&b.local_peer_id(), true);

        let connector = Arc::new(BackoffConnector::new(a.clone(), ConnectorConfig::for_testing()));
        let (queue, rx) = connect_queue(8);
        let cancel = CancellationToken::new();
        let _handle = connector.start(rx, cancel.clone());
        let peer = b.local_peer_id();

        queue.push(b.local_address());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(network.dial_stats(&peer).attempts, 1);
        assert_eq!(connector.backoff_state(&peer).map(|s| s.failures), Some(1));

        // The CannotConnect mark has lapsed, so only backoff holds the peer
        network.set_unreachable(&peer, false);
        assert_eq!(a.connectedness(&peer), Connectedness::NotConnected);

        queue.push(b.local_address());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(network.dial_stats(&peer).attempts, 1, "still backing off");

        tokio::time::sleep(Duration::from_secs(10)).await;
        queue.push(b.local_address());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(network.dial_stats(&peer).attempts, 2);
        assert!(a.connectedness(&peer).is_connected());
        assert!(connector.backoff_state(&peer).is_none(), "success resets the clock");
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_skips_peers_host_reports_unreachable() {
        let network = MemoryNetwork::new();
        let a = network.add_host();
        let b = network.add_host();
        network.set_unreachable(&b.local_peer_id(), true);
        let _ = a.connect(&b.local_address()).await;
        assert_eq!(a.connectedness(&b.local_peer_id()), Connectedness::CannotConnect);
        let attempts_before = network.dial_stats(&b.local_peer_id()).attempts;

        let connector = Arc::new(BackoffConnector::new(a.clone(), ConnectorConfig::for_testing()));
        let (queue, rx) = connect_queue(8);
        let cancel = CancellationToken::new();
        let _handle = connector.start(rx, cancel.clone());

        queue.push(b.local_address());
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(network.dial_stats(&b.local_peer_id()).attempts, attempts_before);
        cancel.cancel();
    }
}
