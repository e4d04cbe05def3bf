//! # Group Bootstrap
//!
//! Stands up `n` local nodes and blocks until they have discovered each
//! other.
//!
//! Each node's peer-found predicate is wrapped to signal a shared
//! [`DiscoveryBarrier`]. The barrier counts distinct `(observer, found)`
//! pairs, so repeated notifications for the same pair count once and the
//! count never passes the target.

use parking_lot::Mutex;
use pf_01_connectivity::OnPeerFound;
use shared_types::{PeerAddress, PeerId};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::domain::{GroupError, NodeError};
use crate::service::components::NodeSpec;
use crate::service::node::{close_all, Node};

#[derive(Debug, Clone)]
pub struct GroupConfig {
    /// Deadline for the whole group to discover itself.
    pub timeout: Duration,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

/// Completes once `target` distinct discoveries have been signalled.
pub struct DiscoveryBarrier {
    target: usize,
    seen: Mutex<HashSet<(PeerId, PeerId)>>,
    progress: watch::Sender<usize>,
}

impl DiscoveryBarrier {
    pub fn new(target: usize) -> Self {
        let (progress, _) = watch::channel(0);
        Self {
            target,
            seen: Mutex::new(HashSet::new()),
            progress,
        }
    }

    /// Barrier for every node of an `n`-node group finding every other.
    pub fn for_group(n: usize) -> Self {
        Self::new(n * n.saturating_sub(1))
    }

    /// Record that `observer` found `found`. Returns `false` for a repeat.
    pub fn signal(&self, observer: PeerId, found: PeerId) -> bool {
        let count = {
            let mut seen = self.seen.lock();
            if !seen.insert((observer, found)) {
                return false;
            }
            seen.len()
        };
        self.progress.send_replace(count.min(self.target));
        true
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.target.saturating_sub(*self.progress.borrow())
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    pub async fn wait(&self) {
        let target = self.target;
        let mut progress = self.progress.subscribe();
        // The sender lives in `self`, so this cannot observe a closed channel
        let _ = progress.wait_for(|count| *count >= target).await;
    }

    /// Wrap `inner` so every accepted peer signals this barrier.
    pub fn wrap(self: &Arc<Self>, observer: PeerId, inner: OnPeerFound) -> OnPeerFound {
        let barrier = Arc::clone(self);
        Arc::new(move |addr: &PeerAddress| {
            let accepted = inner(addr);
            if accepted && barrier.signal(observer, addr.peer_id()) {
                debug!(
                    observer = %observer.short(),
                    found = %addr.peer_id().short(),
                    remaining = barrier.remaining(),
                    "Group discovery"
                );
            }
            accepted
        })
    }
}

/// Build `n` nodes from `factory`, connect each to the ones before it and
/// wait for the group to discover itself.
///
/// The deadline covers node construction, discovery and every connect
/// batch (including its DHT bootstrap). On failure every node built so far
/// is closed.
pub async fn setup_group<F>(
    n: usize,
    mut factory: F,
    config: &GroupConfig,
    parent: &CancellationToken,
) -> Result<Vec<Arc<Node>>, GroupError>
where
    F: FnMut(usize) -> Result<NodeSpec, NodeError>,
{
    let deadline = Instant::now() + config.timeout;
    let barrier = Arc::new(DiscoveryBarrier::for_group(n));
    let mut nodes: Vec<Arc<Node>> = Vec::with_capacity(n);
    let mut previous: Vec<PeerAddress> = Vec::with_capacity(n);
    let mut batches = Vec::with_capacity(n);

    for index in 0..n {
        let node = match build_member(index, &mut factory, &barrier, parent).await {
            Ok(node) => node,
            Err(e) => {
                close_all(&nodes).await;
                return Err(e.into());
            }
        };

        batches.push(node.connect(previous.clone(), true));
        previous.push(node.local_address());
        nodes.push(node);
    }

    let settled = timeout_at(deadline, async {
        barrier.wait().await;
        for mut results in batches {
            while let Some(result) = results.recv().await {
                debug!(peer = %result.info.peer_id().short(), ok = result.is_ok(), "Group connect");
            }
        }
    })
    .await;
    if settled.is_err() {
        close_all(&nodes).await;
        return Err(GroupError::Timeout {
            timeout: config.timeout,
            remaining: barrier.remaining(),
        });
    }

    if let Some(last) = nodes.last() {
        let have = last.host().address_book().len();
        let want = n - 1;
        if have < want {
            close_all(&nodes).await;
            return Err(GroupError::AddressBook { have, want });
        }
    }

    info!(size = n, "Group ready");
    Ok(nodes)
}

async fn build_member<F>(
    index: usize,
    factory: &mut F,
    barrier: &Arc<DiscoveryBarrier>,
    parent: &CancellationToken,
) -> Result<Arc<Node>, NodeError>
where
    F: FnMut(usize) -> Result<NodeSpec, NodeError>,
{
    let mut spec = factory(index)?;
    let observer = spec.components.host.local_peer_id();
    spec.components.on_peer_found =
        barrier.wrap(observer, Arc::clone(&spec.components.on_peer_found));

    let node = Node::from_spec(spec, parent)?;
    if let Err(e) = node.start(None).await {
        let _ = node.close().await;
        return Err(e);
    }
    Ok(node)
}
