//! DHT stub: records bootstraps instead of routing.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{DhtError, DhtRouter, NetworkHost};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::host::MemoryHost;

pub struct MemoryDht {
    host: Arc<MemoryHost>,
    bootstraps: AtomicUsize,
    peers_at_last_bootstrap: Mutex<Option<usize>>,
    closed: AtomicBool,
}

impl MemoryDht {
    pub(crate) fn new(host: Arc<MemoryHost>) -> Self {
        Self {
            host,
            bootstraps: AtomicUsize::new(0),
            peers_at_last_bootstrap: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn bootstrap_count(&self) -> usize {
        self.bootstraps.load(Ordering::SeqCst)
    }

    /// Connected peer count observed by the most recent bootstrap.
    #[must_use]
    pub fn peers_at_last_bootstrap(&self) -> Option<usize> {
        *self.peers_at_last_bootstrap.lock()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DhtRouter for MemoryDht {
    async fn bootstrap(&self) -> Result<(), DhtError> {
        if self.is_closed() {
            return Err(DhtError::Closed);
        }
        *self.peers_at_last_bootstrap.lock() = Some(self.host.peers().len());
        self.bootstraps.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), DhtError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
