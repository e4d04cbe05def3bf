//! # Connect Queue
//!
//! Fixed-capacity queue of peer addresses waiting to be dialed. Producers
//! (discovery, relays, callers) never block: on a full queue the new entry
//! is dropped and counted.

use facade_telemetry::CONNECT_QUEUE_DROPPED;
use shared_types::PeerAddress;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

/// Create a connect queue with the given capacity.
pub fn connect_queue(capacity: usize) -> (ConnectQueue, ConnectQueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let queue = ConnectQueue {
        tx,
        dropped: Arc::new(AtomicU64::new(0)),
    };
    (queue, ConnectQueueReceiver { rx })
}

/// Producer side. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ConnectQueue {
    tx: mpsc::Sender<PeerAddress>,
    dropped: Arc<AtomicU64>,
}

impl ConnectQueue {
    /// Enqueue without waiting. Returns `false` when the entry was dropped.
    pub fn push(&self, addr: PeerAddress) -> bool {
        match self.tx.try_send(addr) {
            Ok(()) => true,
            Err(TrySendError::Full(addr)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                CONNECT_QUEUE_DROPPED.inc();
                debug!(peer = %addr.peer_id(), "Connect queue full, dropping peer");
                false
            }
            Err(TrySendError::Closed(addr)) => {
                debug!(peer = %addr.peer_id(), "Connect queue closed, dropping peer");
                false
            }
        }
    }

    /// Entries dropped by this queue so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side, handed to the backoff connector.
#[derive(Debug)]
pub struct ConnectQueueReceiver {
    rx: mpsc::Receiver<PeerAddress>,
}

impl ConnectQueueReceiver {
    /// Next entry, `None` once every producer is gone.
    pub async fn recv(&mut self) -> Option<PeerAddress> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<PeerAddress> {
        self.rx.try_recv().ok()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
