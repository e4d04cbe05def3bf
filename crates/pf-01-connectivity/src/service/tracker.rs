//! # Connection Tracker
//!
//! Passive observer of host connect/disconnect events. Keeps the set of
//! peers currently counted as connected plus a per-peer gauge, and sweeps
//! the set periodically to correct for missed disconnect events.
//!
//! ## Architecture
//!
//! ```text
//! NetworkHost ──HostEvent──→ [event loop] ──→ on_connected / on_disconnected
//!                               │
//!                         gc ticker ──→ gc()
//!                         Lagged    ──→ reconcile()
//! ```
//!
//! A single consumer loop owns the event receiver; the set itself sits
//! behind one `RwLock` so `gc()` and the accessors can be called from
//! anywhere.

use facade_telemetry::{PEERS_CONNECTED, PEERS_TRACKED};
use parking_lot::RwLock;
use shared_types::{HostEvent, NetworkHost, PeerId};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::TrackerConfig;

pub struct ConnectionTracker {
    host: Arc<dyn NetworkHost>,
    connected: RwLock<HashSet<PeerId>>,
}

impl ConnectionTracker {
    pub fn new(host: Arc<dyn NetworkHost>) -> Self {
        Self {
            host,
            connected: RwLock::new(HashSet::new()),
        }
    }

    /// Count a peer as connected. Repeated events are ignored.
    pub fn on_connected(&self, peer: PeerId) {
        let inserted = self.connected.write().insert(peer);
        if inserted {
            PEERS_CONNECTED.with_label_values(&[&peer.to_string()]).inc();
            PEERS_TRACKED.inc();
            debug!(peer = %peer, "Peer connected");
        }
    }

    /// Forget a peer, unless the host already sees a fresh connection.
    pub fn on_disconnected(&self, peer: PeerId) {
        let state = self.host.connectedness(&peer);
        if !state.is_gone() {
            debug!(peer = %peer, %state, "Ignoring disconnect, peer still live");
            return;
        }
        self.forget(&peer);
    }

    /// Drop every tracked peer the host no longer reports as connected.
    /// Returns how many were removed.
    pub fn gc(&self) -> usize {
        let stale: Vec<PeerId> = self
            .connected
            .read()
            .iter()
            .filter(|peer| self.host.connectedness(peer).is_gone())
            .copied()
            .collect();

        let removed = stale.iter().filter(|peer| self.forget(peer)).count();
        if removed > 0 {
            info!(removed, "Connection tracker sweep removed stale peers");
        }
        removed
    }

    /// Re-sync with the host after dropped events: track every connected
    /// peer the set is missing, then sweep. Returns `(added, removed)`.
    pub fn reconcile(&self) -> (usize, usize) {
        let missing: Vec<PeerId> = {
            let connected = self.connected.read();
            self.host
                .peers()
                .into_iter()
                .filter(|peer| !connected.contains(peer))
                .collect()
        };
        let added = missing.len();
        for peer in missing {
            self.on_connected(peer);
        }
        let removed = self.gc();
        if added > 0 {
            info!(added, removed, "Connection tracker reconciled with host");
        }
        (added, removed)
    }

    fn forget(&self, peer: &PeerId) -> bool {
        let removed = self.connected.write().remove(peer);
        if removed {
            PEERS_CONNECTED.with_label_values(&[&peer.to_string()]).dec();
            PEERS_TRACKED.dec();
            debug!(peer = %peer, "Peer disconnected");
        }
        removed
    }

    #[must_use]
    pub fn is_tracked(&self, peer: &PeerId) -> bool {
        self.connected.read().contains(peer)
    }

    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.connected.read().len()
    }

    #[must_use]
    pub fn tracked_peers(&self) -> Vec<PeerId> {
        self.connected.read().iter().copied().collect()
    }

    /// Spawn the event loop.
    ///
    /// The host subscription is taken before spawning, so no event published
    /// after `start` returns is missed.
    pub fn start(self: &Arc<Self>, config: TrackerConfig, cancel: CancellationToken) -> JoinHandle<()> {
        let mut events = self.host.subscribe_events();
        let tracker = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + config.gc_interval, config.gc_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(HostEvent::Connected(peer)) => tracker.on_connected(peer),
                        Ok(HostEvent::Disconnected(peer)) => tracker.on_disconnected(peer),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Connection tracker lagged behind host events, reconciling");
                            tracker.reconcile();
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = ticker.tick() => {
                        tracker.gc();
                    }
                }
            }
            debug!("Connection tracker stopped");
        })
    }
}
