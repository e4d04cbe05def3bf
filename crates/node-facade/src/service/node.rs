//! # Node
//!
//! Owns one networking stack and every subsystem running on it.
//!
//! ## Architecture
//!
//! ```text
//!                       parent CancellationToken
//!                                 │ child
//!                                 ↓
//! ┌──────────────────────────── Node ─────────────────────────────┐
//! │ DiscoveryBridge ──→ ConnectQueue ──→ BackoffConnector ──┐      │
//! │ ConnectionTracker ←── HostEvent ←─── NetworkHost ←──────┘      │
//! │ PubSubService ──→ PubSubEngine       DhtRouter                 │
//! │ request()/set_request_handler() ──→ pf-03 streams              │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cancelling the parent token closes the node.

use bytes::Bytes;
use parking_lot::Mutex;
use pf_01_connectivity::{
    connect_peers, connect_queue, BackoffConnector, ConnectQueue, ConnectQueueReceiver,
    ConnectionTracker, DiscoveryBridge, PeerConnectionResult,
};
use pf_02_pubsub::PubSubService;
use pf_03_streams::{request, request_handler, StreamError};
use shared_types::{DhtRouter, NetworkHost, PeerAddress, PeerId, ProtocolId};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{NodeConfig, NodeError};
use crate::service::components::{NodeComponents, NodeSpec};

pub struct Node {
    config: NodeConfig,
    host: Arc<dyn NetworkHost>,
    dht: Arc<dyn DhtRouter>,
    pubsub: PubSubService,
    tracker: Arc<ConnectionTracker>,
    connector: Arc<BackoffConnector>,
    discovery: Arc<DiscoveryBridge>,
    discovery_queue: ConnectQueue,
    discovered: Mutex<Option<ConnectQueueReceiver>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    started: AtomicBool,
    closed: AtomicBool,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("peer_id", &self.host.local_peer_id())
            .field("started", &self.started.load(Ordering::SeqCst))
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Node {
    /// Build a node and start its connection tracker.
    ///
    /// Discovery and the connector start with [`start`](Self::start).
    pub fn new(
        config: NodeConfig,
        components: NodeComponents,
        parent: &CancellationToken,
    ) -> Result<Arc<Self>, NodeError> {
        config.validate()?;
        let cancel = parent.child_token();
        let NodeComponents {
            host,
            dht,
            pubsub,
            discovery,
            extra_discovery,
            on_peer_found,
        } = components;

        let pubsub = PubSubService::new(pubsub, &config.pubsub, &cancel)?;
        let tracker = Arc::new(ConnectionTracker::new(Arc::clone(&host)));
        let connector = Arc::new(BackoffConnector::new(
            Arc::clone(&host),
            config.connector_config(),
        ));

        let (discovery_queue, discovered) = connect_queue(config.connector.queue_size);
        let mut bridge = DiscoveryBridge::new(
            Arc::clone(&host),
            discovery_queue.clone(),
            config.discovery_config(),
        )
        .with_on_peer_found(on_peer_found);
        if let Some(primary) = discovery {
            bridge = bridge.with_primary(primary);
        }
        for service in extra_discovery {
            bridge = bridge.with_service(service);
        }

        let tracker_task = tracker.start(config.tracker_config(), cancel.clone());

        let node = Arc::new(Self {
            config,
            host,
            dht,
            pubsub,
            tracker,
            connector,
            discovery: Arc::new(bridge),
            discovery_queue,
            discovered: Mutex::new(Some(discovered)),
            tasks: Mutex::new(vec![tracker_task]),
            cancel,
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        node.spawn_auto_close();

        info!(
            peer = %node.peer_id().short(),
            user_agent = %node.config.user_agent,
            listen = ?node.config.listen_addrs,
            "Node created"
        );
        Ok(node)
    }

    pub fn from_spec(spec: NodeSpec, parent: &CancellationToken) -> Result<Arc<Self>, NodeError> {
        Self::new(spec.config, spec.components, parent)
    }

    fn spawn_auto_close(self: &Arc<Self>) {
        let node = Arc::downgrade(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            if let Some(node) = node.upgrade() {
                if let Err(e) = node.close().await {
                    warn!(error = %e, "Node auto-close failed");
                }
            }
        });
    }

    /// Start discovery and the connector, then bootstrap the DHT.
    ///
    /// `extra` is an additional connect queue fed by the caller; it shares
    /// the connector's backoff cache with discovery.
    pub async fn start(&self, extra: Option<ConnectQueueReceiver>) -> Result<(), NodeError> {
        if self.is_closed() {
            return Err(NodeError::Closed);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(NodeError::AlreadyStarted);
        }

        let discovery_task = self.discovery.start(self.cancel.clone()).await?;
        let mut tasks = vec![discovery_task];

        if let Some(discovered) = self.discovered.lock().take() {
            let handle = self.connector.start(discovered, self.cancel.clone());
            tasks.extend([handle.forward, handle.dial]);
        }
        if let Some(extra) = extra {
            let handle = self.connector.start(extra, self.cancel.clone());
            tasks.extend([handle.forward, handle.dial]);
        }
        self.tasks.lock().extend(tasks);

        self.dht.bootstrap().await?;
        info!(peer = %self.peer_id().short(), "Node started");
        Ok(())
    }

    /// Dial `peers` concurrently; see [`connect_peers`].
    pub fn connect(
        &self,
        peers: Vec<PeerAddress>,
        boot_dht: bool,
    ) -> mpsc::Receiver<PeerConnectionResult> {
        connect_peers(Arc::clone(&self.host), Arc::clone(&self.dht), peers, boot_dht)
    }

    /// One request/response exchange with `peer` on `protocol`.
    pub async fn request(
        &self,
        peer: &PeerId,
        protocol: &ProtocolId,
        data: impl Into<Bytes>,
    ) -> Result<Bytes, StreamError> {
        request(
            self.host.as_ref(),
            peer,
            protocol,
            data,
            &self.config.stream_config(),
            &self.cancel,
        )
        .await
    }

    /// Answer requests on `protocol` with `respond_with`.
    pub fn set_request_handler<F, Fut>(&self, protocol: ProtocolId, respond_with: F)
    where
        F: Fn(PeerId, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Bytes>> + Send + 'static,
    {
        self.host.set_stream_handler(
            protocol,
            request_handler(self.config.stream_config(), respond_with),
        );
    }

    /// Cancel every loop and close pubsub, discovery, DHT and host.
    ///
    /// Every component is closed even if an earlier one fails. Closing twice
    /// is a no-op.
    pub async fn close(&self) -> Result<(), NodeError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.cancel.cancel();

        let mut failures = Vec::new();
        if let Err(e) = self.pubsub.close().await {
            failures.push(format!("pubsub: {e}"));
        }
        if let Err(e) = self.discovery.close().await {
            failures.push(format!("discovery: {e}"));
        }
        if let Err(e) = self.dht.close().await {
            failures.push(format!("dht: {e}"));
        }
        if let Err(e) = self.host.close().await {
            failures.push(format!("host: {e}"));
        }

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                debug!(error = %e, "Node task ended abnormally");
            }
        }

        if failures.is_empty() {
            info!(peer = %self.peer_id().short(), "Node closed");
            Ok(())
        } else {
            warn!(peer = %self.peer_id().short(), failures = ?failures, "Node closed with errors");
            Err(NodeError::Close(failures))
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    #[must_use]
    pub fn host(&self) -> &Arc<dyn NetworkHost> {
        &self.host
    }

    #[must_use]
    pub fn dht(&self) -> &Arc<dyn DhtRouter> {
        &self.dht
    }

    #[must_use]
    pub fn pubsub(&self) -> &PubSubService {
        &self.pubsub
    }

    #[must_use]
    pub fn tracker(&self) -> &Arc<ConnectionTracker> {
        &self.tracker
    }

    #[must_use]
    pub fn connector(&self) -> &Arc<BackoffConnector> {
        &self.connector
    }

    /// Queue discovery feeds; callers may push their own peers too.
    #[must_use]
    pub fn connect_queue(&self) -> &ConnectQueue {
        &self.discovery_queue
    }

    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        self.host.local_peer_id()
    }

    #[must_use]
    pub fn local_address(&self) -> PeerAddress {
        self.host.local_address()
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Build and start one node per spec.
///
/// Fails on the first error, closing the nodes already built.
pub async fn start_nodes(
    specs: Vec<NodeSpec>,
    parent: &CancellationToken,
) -> Result<Vec<Arc<Node>>, NodeError> {
    let mut nodes = Vec::with_capacity(specs.len());
    for spec in specs {
        let started = match Node::from_spec(spec, parent) {
            Ok(node) => {
                let outcome = node.start(None).await;
                nodes.push(node);
                outcome
            }
            Err(e) => Err(e),
        };
        if let Err(e) = started {
            close_all(&nodes).await;
            return Err(e);
        }
    }
    Ok(nodes)
}

pub(crate) async fn close_all(nodes: &[Arc<Node>]) {
    for node in nodes {
        if let Err(e) = node.close().await {
            warn!(peer = %node.peer_id().short(), error = %e, "Failed to close node");
        }
    }
}
