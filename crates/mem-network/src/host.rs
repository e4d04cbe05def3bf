//! In-memory [`NetworkHost`].
//!
//! Connections are symmetric links recorded on both hosts. Streams are
//! `tokio::io::duplex` pairs; the remote half is handed to the protocol
//! handler registered on the target host.

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{
    Connectedness, HostError, HostEvent, NetworkHost, P2pStream, PeerAddress, PeerId, ProtocolId,
    StreamHandler,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

use crate::network::MemoryNetwork;

const EVENT_CAPACITY: usize = 256;
const STREAM_BUFFER: usize = 64 * 1024;

#[derive(Default)]
struct HostState {
    connectedness: HashMap<PeerId, Connectedness>,
    address_book: HashMap<PeerId, PeerAddress>,
    unreachable_until: HashMap<PeerId, Instant>,
}

impl HostState {
    fn connectedness(&self, peer: &PeerId, now: Instant) -> Connectedness {
        match self.connectedness.get(peer).copied().unwrap_or_default() {
            Connectedness::CannotConnect
                if self.unreachable_until.get(peer).map_or(true, |until| now >= *until) =>
            {
                Connectedness::NotConnected
            }
            state => state,
        }
    }
}

pub struct MemoryHost {
    id: PeerId,
    addrs: Vec<String>,
    network: MemoryNetwork,
    state: RwLock<HostState>,
    handlers: RwLock<HashMap<ProtocolId, StreamHandler>>,
    events: broadcast::Sender<HostEvent>,
    closed: AtomicBool,
}

impl MemoryHost {
    pub(crate) fn new(id: PeerId, addrs: Vec<String>, network: MemoryNetwork) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            id,
            addrs,
            network,
            state: RwLock::new(HostState::default()),
            handlers: RwLock::new(HashMap::new()),
            events,
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Clear any connectedness mark for `peer` that is not a live link.
    pub fn forget_peer(&self, peer: &PeerId) {
        let mut state = self.state.write();
        if state.connectedness.get(peer) != Some(&Connectedness::Connected) {
            state.connectedness.remove(peer);
            state.unreachable_until.remove(peer);
        }
    }

    /// Record the link and announce it. No event if already connected.
    fn add_link(&self, remote: &PeerAddress) {
        let newly_connected = {
            let mut state = self.state.write();
            state.address_book.insert(remote.peer_id(), remote.clone());
            state.unreachable_until.remove(&remote.peer_id());
            state
                .connectedness
                .insert(remote.peer_id(), Connectedness::Connected)
                != Some(Connectedness::Connected)
        };
        if newly_connected {
            let _ = self.events.send(HostEvent::Connected(remote.peer_id()));
        }
    }

    pub(crate) fn drop_link(&self, peer: &PeerId) {
        let was_connected = {
            let mut state = self.state.write();
            match state.connectedness.get_mut(peer) {
                Some(c) if *c == Connectedness::Connected => {
                    *c = Connectedness::NotConnected;
                    true
                }
                _ => false,
            }
        };
        if was_connected {
            let _ = self.events.send(HostEvent::Disconnected(*peer));
        }
    }

    /// Report `peer` as `CannotConnect` until the network's mark TTL passes.
    fn mark_unreachable(&self, peer: &PeerId) {
        let until = Instant::now() + self.network.unreachable_ttl();
        let mut state = self.state.write();
        if state.connectedness.get(peer) != Some(&Connectedness::Connected) {
            state.connectedness.insert(*peer, Connectedness::CannotConnect);
            state.unreachable_until.insert(*peer, until);
        }
    }

    fn ensure_open(&self) -> Result<(), HostError> {
        if self.is_closed() {
            return Err(HostError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl NetworkHost for MemoryHost {
    fn local_peer_id(&self) -> PeerId {
        self.id
    }

    fn listen_addrs(&self) -> Vec<String> {
        self.addrs.clone()
    }

    async fn connect(&self, peer: &PeerAddress) -> Result<(), HostError> {
        self.ensure_open()?;
        let target_id = peer.peer_id();
        if target_id == self.id {
            return Err(HostError::SelfDial);
        }
        if self.connectedness(&target_id).is_connected() {
            return Ok(());
        }

        if !peer.addrs().is_empty() {
            self.state
                .write()
                .address_book
                .insert(target_id, peer.clone());
        }

        let _dial = self.network.begin_dial(target_id);
        let delay = self.network.dial_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.ensure_open()?;

        let target = self
            .network
            .host(&target_id)
            .filter(|_| !self.network.is_unreachable(&target_id));
        let Some(target) = target else {
            self.mark_unreachable(&target_id);
            debug!(peer = %target_id.short(), "Memory dial failed");
            return Err(HostError::Unreachable(target_id));
        };

        self.add_link(&target.local_address());
        target.add_link(&self.local_address());
        Ok(())
    }

    fn connectedness(&self, peer: &PeerId) -> Connectedness {
        self.state.read().connectedness(peer, Instant::now())
    }

    fn peers(&self) -> Vec<PeerId> {
        self.state
            .read()
            .connectedness
            .iter()
            .filter(|(_, c)| c.is_connected())
            .map(|(id, _)| *id)
            .collect()
    }

    fn address_book(&self) -> Vec<PeerId> {
        self.state.read().address_book.keys().copied().collect()
    }

    fn set_stream_handler(&self, protocol: ProtocolId, handler: StreamHandler) {
        self.handlers.write().insert(protocol, handler);
    }

    fn remove_stream_handler(&self, protocol: &ProtocolId) {
        self.handlers.write().remove(protocol);
    }

    async fn new_stream(
        &self,
        peer: &PeerId,
        protocol: &ProtocolId,
    ) -> Result<P2pStream, HostError> {
        self.ensure_open()?;
        if !self.connectedness(peer).is_connected() {
            let known = self.state.read().address_book.get(peer).cloned();
            let addr = known.unwrap_or_else(|| PeerAddress::new(*peer, Vec::new()));
            self.connect(&addr).await?;
        }

        let target = self
            .network
            .host(peer)
            .ok_or(HostError::Unreachable(*peer))?;
        let handler = target
            .handlers
            .read()
            .get(protocol)
            .cloned()
            .ok_or_else(|| HostError::ProtocolNotSupported {
                peer: *peer,
                protocol: protocol.clone(),
            })?;

        let (local, remote) = tokio::io::duplex(STREAM_BUFFER);
        tokio::spawn(handler(P2pStream::new(self.id, protocol.clone(), remote)));
        Ok(P2pStream::new(*peer, protocol.clone(), local))
    }

    fn subscribe_events(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    async fn close(&self) -> Result<(), HostError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for peer in self.peers() {
            self.network.disconnect(&self.id, &peer);
            // `disconnect` skips closed hosts, so drop our side directly
            self.drop_link(&peer);
        }
        self.network.remove_host(&self.id);
        debug!(peer = %self.id.short(), "Memory host closed");
        Ok(())
    }
}
