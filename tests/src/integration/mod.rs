//! Integration flows over [`mem_network::MemoryNetwork`].

pub mod group_flows;
pub mod pubsub_flows;
pub mod stream_flows;

use node_facade::{memory_spec, setup_group, GroupConfig, GroupError, Node, NodeConfig};
use mem_network::MemoryNetwork;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Build a discovered, fully connected group of `n` test nodes.
pub async fn test_group(
    network: &MemoryNetwork,
    n: usize,
    root: &CancellationToken,
) -> Result<Vec<Arc<Node>>, GroupError> {
    let network = network.clone();
    setup_group(
        n,
        move |_| Ok(memory_spec(&network, NodeConfig::for_testing())),
        &GroupConfig::default(),
        root,
    )
    .await
}
