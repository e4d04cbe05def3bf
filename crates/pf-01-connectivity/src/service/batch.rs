//! Batch connect and peer-count polling helpers.

use shared_types::{DhtRouter, NetworkHost, PeerAddress};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::{ConnectivityError, PeerConnectionResult};

const PEER_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Dial every peer concurrently and stream the outcomes.
///
/// One result is sent per input peer as soon as its attempt finishes. When
/// `boot_dht` is set the router is bootstrapped only after the whole batch
/// has completed; the channel closes after that, so a reader that drains it
/// to `None` has also seen the bootstrap finish.
pub fn connect_peers(
    host: Arc<dyn NetworkHost>,
    dht: Arc<dyn DhtRouter>,
    peers: Vec<PeerAddress>,
    boot_dht: bool,
) -> mpsc::Receiver<PeerConnectionResult> {
    let (tx, rx) = mpsc::channel(peers.len().max(1));

    tokio::spawn(async move {
        let mut dials = JoinSet::new();
        for peer in peers {
            let host = Arc::clone(&host);
            let tx = tx.clone();
            dials.spawn(async move {
                let outcome = host.connect(&peer).await;
                if let Err(e) = &outcome {
                    debug!(peer = %peer.peer_id(), error = %e, "Batch dial failed");
                }
                // Capacity equals the batch size, so this never waits
                let _ = tx.send(PeerConnectionResult::new(peer, outcome)).await;
            });
        }
        while dials.join_next().await.is_some() {}

        if boot_dht {
            if let Err(e) = dht.bootstrap().await {
                warn!(error = %e, "DHT bootstrap after batch connect failed");
            }
        }
        drop(tx);
    });

    rx
}

/// Wait until the host reports at least `want` connected peers.
pub async fn wait_for_peers(
    host: &dyn NetworkHost,
    want: usize,
    timeout: Duration,
) -> Result<(), ConnectivityError> {
    let deadline = Instant::now() + timeout;
    loop {
        let have = host.peers().len();
        if have >= want {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(ConnectivityError::PeersTimeout { want, have });
        }
        tokio::time::sleep(PEER_POLL_INTERVAL).await;
    }
}
