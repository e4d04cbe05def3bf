use shared_types::{HostError, PeerAddress};
use std::time::SystemTime;

/// Outcome of one connection attempt in a batch.
#[derive(Debug, Clone)]
pub struct PeerConnectionResult {
    /// `None` on success.
    pub error: Option<HostError>,
    pub info: PeerAddress,
    /// When the attempt finished.
    pub time: SystemTime,
}

impl PeerConnectionResult {
    #[must_use]
    pub fn new(info: PeerAddress, outcome: Result<(), HostError>) -> Self {
        Self {
            error: outcome.err(),
            info,
            time: SystemTime::now(),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
