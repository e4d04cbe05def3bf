use shared_types::{DiscoveryError, HostError};
use thiserror::Error;

/// Errors surfaced by the connectivity subsystem.
///
/// Individual dial failures never show up here: they are reported on the
/// batch result channel or logged, and only drive backoff.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectivityError {
    /// The primary discovery service failed and nothing else was configured.
    #[error("Discovery setup failed: {0}")]
    DiscoverySetup(#[source] DiscoveryError),

    #[error("Discovery shutdown failed: {0}")]
    DiscoveryClose(#[source] DiscoveryError),

    /// Not enough peers connected before the deadline.
    #[error("Timed out waiting for {want} peers, have {have}")]
    PeersTimeout { want: usize, have: usize },

    #[error("Host error: {0}")]
    Host(#[from] HostError),
}
