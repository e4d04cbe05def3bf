//! # Driven Ports (Outbound SPI)
//!
//! Capabilities the facade **requires** from the networking stack. A
//! production node plugs in its transport, Kademlia router, gossip engine
//! and mDNS-style discovery here; tests plug in the in-memory stack.
//!
//! # Thread Safety
//!
//! Every port is `Send + Sync` and shared as `Arc<dyn Port>` between the
//! subsystem loops.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::{broadcast, mpsc};

use crate::entities::{Connectedness, HostEvent, PeerAddress, PeerId, ProtocolId, PubSubMessage};
use crate::errors::{DhtError, DiscoveryError, HostError, PubSubEngineError};

// =============================================================================
// STREAMS
// =============================================================================

/// Byte-level duplex channel backing a [`P2pStream`].
pub trait StreamIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> StreamIo for T {}

/// A single multiplexed bidirectional stream to a remote peer.
///
/// Dropping the stream resets it; `shutdown()` half-closes the write side.
pub struct P2pStream {
    remote: PeerId,
    protocol: ProtocolId,
    io: Box<dyn StreamIo>,
}

impl P2pStream {
    pub fn new(remote: PeerId, protocol: ProtocolId, io: impl StreamIo + 'static) -> Self {
        Self {
            remote,
            protocol,
            io: Box::new(io),
        }
    }

    #[must_use]
    pub fn remote_peer(&self) -> PeerId {
        self.remote
    }

    #[must_use]
    pub fn protocol(&self) -> &ProtocolId {
        &self.protocol
    }
}

impl fmt::Debug for P2pStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("P2pStream")
            .field("remote", &self.remote)
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

impl AsyncRead for P2pStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for P2pStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut *self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.io).poll_shutdown(cx)
    }
}

/// Handler invoked by the host for every inbound stream of a protocol.
///
/// The host spawns the returned future; handlers never block the accept path.
pub type StreamHandler = Arc<dyn Fn(P2pStream) -> BoxFuture<'static, ()> + Send + Sync>;

// =============================================================================
// NETWORK HOST
// =============================================================================

/// Transport, security and multiplexing supplied by the networking stack.
///
/// Cancellation is the caller's concern: wrap `connect`/`new_stream` in a
/// timeout or `select!` against a cancellation token.
#[async_trait]
pub trait NetworkHost: Send + Sync {
    fn local_peer_id(&self) -> PeerId;

    fn listen_addrs(&self) -> Vec<String>;

    /// Our own id plus listen addresses, as others would discover us.
    fn local_address(&self) -> PeerAddress {
        PeerAddress::new(self.local_peer_id(), self.listen_addrs())
    }

    /// Dial a peer. Succeeds immediately when already connected.
    async fn connect(&self, peer: &PeerAddress) -> Result<(), HostError>;

    fn connectedness(&self, peer: &PeerId) -> Connectedness;

    /// Peers with a live connection.
    fn peers(&self) -> Vec<PeerId>;

    /// Every peer we hold addresses for, connected or not.
    fn address_book(&self) -> Vec<PeerId>;

    fn set_stream_handler(&self, protocol: ProtocolId, handler: StreamHandler);

    fn remove_stream_handler(&self, protocol: &ProtocolId);

    /// Open a stream, dialing first if needed.
    async fn new_stream(&self, peer: &PeerId, protocol: &ProtocolId)
        -> Result<P2pStream, HostError>;

    /// Connect/disconnect notifications. Slow receivers observe `Lagged`.
    fn subscribe_events(&self) -> broadcast::Receiver<HostEvent>;

    async fn close(&self) -> Result<(), HostError>;
}

// =============================================================================
// DHT ROUTER
// =============================================================================

/// Opaque Kademlia-style router. The facade only bootstraps and closes it.
#[async_trait]
pub trait DhtRouter: Send + Sync {
    async fn bootstrap(&self) -> Result<(), DhtError>;

    async fn close(&self) -> Result<(), DhtError>;
}

// =============================================================================
// PUBSUB ENGINE
// =============================================================================

/// Gossip engine. Mesh maintenance and wire format stay behind this trait.
#[async_trait]
pub trait PubSubEngine: Send + Sync {
    /// Join a topic. Engines may refuse a second live handle for a name.
    async fn join(&self, topic: &str) -> Result<Arc<dyn EngineTopic>, PubSubEngineError>;
}

/// A joined topic.
#[async_trait]
pub trait EngineTopic: Send + Sync {
    fn name(&self) -> &str;

    async fn subscribe(&self) -> Result<Arc<dyn EngineSubscription>, PubSubEngineError>;

    async fn publish(&self, data: Vec<u8>) -> Result<(), PubSubEngineError>;

    /// Peers currently in this topic's mesh.
    fn list_peers(&self) -> Vec<PeerId>;

    async fn close(&self) -> Result<(), PubSubEngineError>;
}

/// A live subscription. `next` is meant for a single reader.
#[async_trait]
pub trait EngineSubscription: Send + Sync {
    fn topic(&self) -> &str;

    /// Block until the next message. Fails with `SubscriptionCancelled` or
    /// `TopicClosed` once the subscription is over.
    async fn next(&self) -> Result<PubSubMessage, PubSubEngineError>;

    fn cancel(&self);
}

// =============================================================================
// DISCOVERY
// =============================================================================

/// A source of peer-found notifications (local broadcast, rendezvous, ...).
///
/// Services push into the supplied sender with `try_send`; a full channel
/// drops the notification rather than stalling the service.
#[async_trait]
pub trait DiscoveryService: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self, found: mpsc::Sender<PeerAddress>) -> Result<(), DiscoveryError>;

    async fn close(&self) -> Result<(), DiscoveryError>;
}
