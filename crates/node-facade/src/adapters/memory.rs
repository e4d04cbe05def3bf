//! In-process component set backed by [`MemoryNetwork`].

use mem_network::MemoryNetwork;

use crate::domain::NodeConfig;
use crate::service::{NodeComponents, NodeSpec};

/// Fresh host on `network` with its DHT, gossip engine and, unless the
/// config disables it, local broadcast discovery under the configured tag.
pub fn memory_components(network: &MemoryNetwork, config: &NodeConfig) -> NodeComponents {
    let host = network.add_host();
    let components = NodeComponents::new(
        host.clone(),
        network.dht_for(&host),
        network.pubsub_for(&host),
    );

    match &config.mdns_service_tag {
        Some(tag) => components.with_discovery(network.discovery_with_interval(
            tag,
            &host,
            config.discovery_interval(),
        )),
        None => components,
    }
}

pub fn memory_spec(network: &MemoryNetwork, config: NodeConfig) -> NodeSpec {
    let components = memory_components(network, &config);
    NodeSpec::new(config, components)
}
