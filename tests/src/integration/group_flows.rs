//! # Group Bootstrap Flows
//!
//! Whole-node connectivity: a group discovers itself, members track each
//! other, a closed member is forgotten, and an unreachable peer is retried
//! only after its backoff window.

#[cfg(test)]
mod tests {
    use super::super::test_group;
    use mem_network::MemoryNetwork;
    use node_facade::{Node, NodeComponents, NodeConfig};
    use pf_01_connectivity::wait_for_peers;
    use shared_types::{Connectedness, NetworkHost};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timeout waiting for {what}"));
    }

    // =========================================================================
    // GROUP BOOTSTRAP
    // =========================================================================

    #[tokio::test]
    async fn test_group_of_four_forms_full_mesh() {
        let network = MemoryNetwork::new();
        let root = CancellationToken::new();

        let nodes = test_group(&network, 4, &root).await.expect("group");

        for node in &nodes {
            wait_for_peers(node.host().as_ref(), 3, Duration::from_secs(3))
                .await
                .expect("mesh");
        }
        for node in &nodes {
            let tracker = Arc::clone(node.tracker());
            eventually("tracker", || tracker.tracked_count() == 3).await;
        }
        root.cancel();
    }

    #[tokio::test]
    async fn test_closed_member_is_forgotten_by_the_rest() {
        let network = MemoryNetwork::new();
        let root = CancellationToken::new();
        let nodes = test_group(&network, 3, &root).await.expect("group");
        let leaving = nodes[2].peer_id();
        for node in &nodes[..2] {
            let tracker = Arc::clone(node.tracker());
            eventually("tracked", || tracker.is_tracked(&leaving)).await;
        }

        nodes[2].close().await.expect("close");

        for node in &nodes[..2] {
            let tracker = Arc::clone(node.tracker());
            eventually("forgotten", || !tracker.is_tracked(&leaving)).await;
            assert!(!node.host().connectedness(&leaving).is_connected());
        }
        root.cancel();
    }

    #[tokio::test]
    async fn test_root_cancel_closes_the_whole_group() {
        let network = MemoryNetwork::new();
        let root = CancellationToken::new();
        let nodes = test_group(&network, 3, &root).await.expect("group");

        root.cancel();

        for node in &nodes {
            let node = Arc::clone(node);
            eventually("closed", || node.is_closed()).await;
        }
    }

    // =========================================================================
    // BACKOFF
    // =========================================================================

    #[tokio::test]
    async fn test_unreachable_peer_retried_after_backoff() {
        let network = MemoryNetwork::new();
        let root = CancellationToken::new();
        let mut config = NodeConfig::for_testing();
        config.mdns_service_tag = None;
        config.connector.backoff_low_secs = 1;

        network.set_unreachable_ttl(Duration::from_millis(50));
        let host = network.add_host();
        let components =
            NodeComponents::new(host.clone(), network.dht_for(&host), network.pubsub_for(&host));
        let node = Node::new(config, components, &root).expect("node");
        node.start(None).await.expect("start");

        let target = network.add_host();
        let target_id = target.local_peer_id();
        network.set_unreachable(&target_id, true);

        assert!(node.connect_queue().push(target.local_address()));
        eventually("first failure", || {
            node.connector()
                .backoff_state(&target_id)
                .is_some_and(|s| s.failures == 1 && !s.in_flight)
        })
        .await;
        assert_eq!(network.dial_stats(&target_id).attempts, 1);

        // Inside the window the peer is skipped without touching the transport.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(host.connectedness(&target_id), Connectedness::NotConnected);
        assert!(node.connect_queue().push(target.local_address()));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(network.dial_stats(&target_id).attempts, 1);

        network.set_unreachable(&target_id, false);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(node.connect_queue().push(target.local_address()));

        eventually("connected", || host.connectedness(&target_id).is_connected()).await;
        assert_eq!(network.dial_stats(&target_id).attempts, 2);
        assert_eq!(network.dial_stats(&target_id).max_concurrent, 1);
        root.cancel();
    }
}
