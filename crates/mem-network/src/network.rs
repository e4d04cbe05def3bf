//! # Network Hub
//!
//! Shared registry every in-memory host, engine and discovery service hangs
//! off. Also carries the knobs tests use to shape the network: dial delay,
//! unreachable peers, blocked or duplicated discovery.

use parking_lot::{Mutex, RwLock};
use shared_types::{NetworkHost, PeerAddress, PeerId, PubSubMessage};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::dht::MemoryDht;
use crate::discovery::MemoryDiscovery;
use crate::host::MemoryHost;
use crate::pubsub::MemoryPubSub;

const TOPIC_CAPACITY: usize = 1024;
/// How long a failed dial keeps a peer marked `CannotConnect`.
pub const DEFAULT_UNREACHABLE_TTL: Duration = Duration::from_secs(5);

/// Dial statistics for one target peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DialStats {
    /// Dials that reached the transport (already-connected short cuts excluded).
    pub attempts: u64,
    /// Dials currently running.
    pub in_flight: u64,
    /// Highest `in_flight` ever observed.
    pub max_concurrent: u64,
}

pub(crate) struct DiscoveryMember {
    pub(crate) address: PeerAddress,
    pub(crate) found: mpsc::Sender<PeerAddress>,
}

#[derive(Default)]
pub(crate) struct NetworkInner {
    hosts: RwLock<HashMap<PeerId, Weak<MemoryHost>>>,
    next_addr: AtomicU64,
    dial_delay: RwLock<Duration>,
    unreachable: RwLock<HashSet<PeerId>>,
    unreachable_ttl: RwLock<Option<Duration>>,
    dial_stats: Mutex<HashMap<PeerId, DialStats>>,
    topics: RwLock<HashMap<String, broadcast::Sender<PubSubMessage>>>,
    topic_members: RwLock<HashMap<String, HashSet<PeerId>>>,
    discovery: Mutex<HashMap<String, Vec<DiscoveryMember>>>,
    discovery_blocked: AtomicBool,
    discovery_duplicates: AtomicBool,
}

/// Handle to an in-process network. Cheap to clone.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<NetworkInner>,
}

impl MemoryNetwork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // HOSTS
    // =========================================================================

    /// Create a host with a fresh random identity.
    pub fn add_host(&self) -> Arc<MemoryHost> {
        self.add_host_with_id(PeerId::random())
    }

    pub fn add_host_with_id(&self, id: PeerId) -> Arc<MemoryHost> {
        let n = self.inner.next_addr.fetch_add(1, Ordering::Relaxed);
        let host = Arc::new(MemoryHost::new(id, vec![format!("/memory/{n}")], self.clone()));
        self.inner.hosts.write().insert(id, Arc::downgrade(&host));
        debug!(peer = %id.short(), "Memory host added");
        host
    }

    pub(crate) fn host(&self, id: &PeerId) -> Option<Arc<MemoryHost>> {
        self.inner
            .hosts
            .read()
            .get(id)
            .and_then(Weak::upgrade)
            .filter(|host| !host.is_closed())
    }

    pub(crate) fn remove_host(&self, id: &PeerId) {
        self.inner.hosts.write().remove(id);
    }

    /// Drop the connection between two hosts, emitting events on both sides.
    pub fn disconnect(&self, a: &PeerId, b: &PeerId) {
        if let Some(host) = self.host(a) {
            host.drop_link(b);
        }
        if let Some(host) = self.host(b) {
            host.drop_link(a);
        }
    }

    // =========================================================================
    // DIAL SHAPING
    // =========================================================================

    /// Delay every dial by `delay` before it resolves.
    pub fn set_dial_delay(&self, delay: Duration) {
        *self.inner.dial_delay.write() = delay;
    }

    pub(crate) fn dial_delay(&self) -> Duration {
        *self.inner.dial_delay.read()
    }

    /// Make dials to `peer` fail.
    pub fn set_unreachable(&self, peer: &PeerId, unreachable: bool) {
        let mut set = self.inner.unreachable.write();
        if unreachable {
            set.insert(*peer);
        } else {
            set.remove(peer);
        }
    }

    pub(crate) fn is_unreachable(&self, peer: &PeerId) -> bool {
        self.inner.unreachable.read().contains(peer)
    }

    /// How long hosts report `CannotConnect` after a failed dial.
    pub fn set_unreachable_ttl(&self, ttl: Duration) {
        *self.inner.unreachable_ttl.write() = Some(ttl);
    }

    #[must_use]
    pub fn unreachable_ttl(&self) -> Duration {
        self.inner
            .unreachable_ttl
            .read()
            .unwrap_or(DEFAULT_UNREACHABLE_TTL)
    }

    #[must_use]
    pub fn dial_stats(&self, peer: &PeerId) -> DialStats {
        self.inner.dial_stats.lock().get(peer).copied().unwrap_or_default()
    }

    pub(crate) fn begin_dial(&self, peer: PeerId) -> DialGuard {
        let mut stats = self.inner.dial_stats.lock();
        let entry = stats.entry(peer).or_default();
        entry.attempts += 1;
        entry.in_flight += 1;
        entry.max_concurrent = entry.max_concurrent.max(entry.in_flight);
        DialGuard {
            network: self.clone(),
            peer,
        }
    }

    // =========================================================================
    // COMPONENT FACTORIES
    // =========================================================================

    /// DHT stub bound to `host`.
    pub fn dht_for(&self, host: &Arc<MemoryHost>) -> Arc<MemoryDht> {
        Arc::new(MemoryDht::new(Arc::clone(host)))
    }

    /// Gossip engine bound to `host`.
    pub fn pubsub_for(&self, host: &Arc<MemoryHost>) -> Arc<MemoryPubSub> {
        Arc::new(MemoryPubSub::new(Arc::clone(host), self.clone()))
    }

    /// Local broadcast discovery for `host` under service tag `tag`.
    pub fn discovery(&self, tag: &str, host: &Arc<MemoryHost>) -> Arc<MemoryDiscovery> {
        Arc::new(MemoryDiscovery::new(tag, host.local_address(), self.clone(), None))
    }

    /// Same as [`discovery`](Self::discovery), re-announcing every `interval`.
    pub fn discovery_with_interval(
        &self,
        tag: &str,
        host: &Arc<MemoryHost>,
        interval: Duration,
    ) -> Arc<MemoryDiscovery> {
        Arc::new(MemoryDiscovery::new(
            tag,
            host.local_address(),
            self.clone(),
            Some(interval),
        ))
    }

    // =========================================================================
    // PUBSUB REGISTRY
    // =========================================================================

    pub(crate) fn topic_sender(&self, name: &str) -> broadcast::Sender<PubSubMessage> {
        if let Some(sender) = self.inner.topics.read().get(name) {
            return sender.clone();
        }
        self.inner
            .topics
            .write()
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }

    pub(crate) fn add_topic_member(&self, name: &str, peer: PeerId) {
        self.inner
            .topic_members
            .write()
            .entry(name.to_string())
            .or_default()
            .insert(peer);
    }

    pub(crate) fn remove_topic_member(&self, name: &str, peer: &PeerId) {
        if let Some(members) = self.inner.topic_members.write().get_mut(name) {
            members.remove(peer);
        }
    }

    pub(crate) fn topic_members(&self, name: &str) -> Vec<PeerId> {
        self.inner
            .topic_members
            .read()
            .get(name)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    // =========================================================================
    // DISCOVERY HUB
    // =========================================================================

    /// Suppress discovery notifications while `blocked`.
    pub fn block_discovery(&self, blocked: bool) {
        self.inner.discovery_blocked.store(blocked, Ordering::SeqCst);
    }

    /// Deliver every discovery notification twice.
    pub fn duplicate_discovery(&self, duplicate: bool) {
        self.inner.discovery_duplicates.store(duplicate, Ordering::SeqCst);
    }

    pub(crate) fn join_discovery(&self, tag: &str, address: PeerAddress, found: mpsc::Sender<PeerAddress>) {
        let mut hub = self.inner.discovery.lock();
        let members = hub.entry(tag.to_string()).or_default();
        members.retain(|m| m.address.peer_id() != address.peer_id());
        members.push(DiscoveryMember { address, found });
    }

    pub(crate) fn leave_discovery(&self, tag: &str, peer: &PeerId) {
        if let Some(members) = self.inner.discovery.lock().get_mut(tag) {
            members.retain(|m| m.address.peer_id() != *peer);
        }
    }

    /// Introduce `peer` and every other member of `tag` to each other.
    pub(crate) fn announce(&self, tag: &str, peer: &PeerId) {
        if self.inner.discovery_blocked.load(Ordering::SeqCst) {
            return;
        }
        let copies = if self.inner.discovery_duplicates.load(Ordering::SeqCst) {
            2
        } else {
            1
        };

        let hub = self.inner.discovery.lock();
        let Some(members) = hub.get(tag) else {
            return;
        };
        let Some(me) = members.iter().find(|m| m.address.peer_id() == *peer) else {
            return;
        };

        for other in members.iter().filter(|m| m.address.peer_id() != *peer) {
            for _ in 0..copies {
                // Full or closed receivers simply miss the notification
                let _ = me.found.try_send(other.address.clone());
                let _ = other.found.try_send(me.address.clone());
            }
        }
    }
}

/// Decrements the in-flight dial count when the dial ends or is dropped.
pub(crate) struct DialGuard {
    network: MemoryNetwork,
    peer: PeerId,
}

impl Drop for DialGuard {
    fn drop(&mut self) {
        if let Some(entry) = self.network.inner.dial_stats.lock().get_mut(&self.peer) {
            entry.in_flight = entry.in_flight.saturating_sub(1);
        }
    }
}
