//! # PubSub Flows
//!
//! Topic sessions on every member of a bootstrapped group: fan-out in
//! publish order, handler-mode delivery, unsubscribe isolation and shutdown.

#[cfg(test)]
mod tests {
    use super::super::test_group;
    use mem_network::MemoryNetwork;
    use pf_02_pubsub::{MessageHandler, PubSubError};
    use shared_types::PubSubMessage;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use tokio_util::sync::CancellationToken;

    const TOPIC: &str = "blocks";

    // =========================================================================
    // FAN-OUT
    // =========================================================================

    #[tokio::test]
    async fn test_publish_reaches_every_member_in_order() -> anyhow::Result<()> {
        let network = MemoryNetwork::new();
        let root = CancellationToken::new();
        let nodes = test_group(&network, 3, &root).await?;

        let mut subs = Vec::new();
        for node in &nodes {
            subs.push(node.pubsub().subscribe(TOPIC, 0).await?);
        }
        for i in 0..3u8 {
            nodes[0].pubsub().publish(TOPIC, vec![i]).await?;
        }

        for sub in &subs {
            for i in 0..3u8 {
                let message = timeout(Duration::from_secs(2), sub.recv())
                    .await?
                    .expect("subscription open");
                assert_eq!(message.data, vec![i]);
                assert_eq!(message.from, nodes[0].peer_id());
            }
        }

        let mut peers = nodes[0].pubsub().topic_peers(TOPIC).await;
        peers.sort();
        let mut expected = vec![nodes[1].peer_id(), nodes[2].peer_id()];
        expected.sort();
        assert_eq!(peers, expected);

        root.cancel();
        Ok(())
    }

    #[tokio::test]
    async fn test_handler_mode_receives_remote_messages() -> anyhow::Result<()> {
        let network = MemoryNetwork::new();
        let root = CancellationToken::new();
        let nodes = test_group(&network, 2, &root).await?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler: MessageHandler = Arc::new(move |message: PubSubMessage| {
            let _ = tx.send(message);
        });
        nodes[1].pubsub().subscribe_with_handler(TOPIC, handler, 0).await?;
        nodes[0].pubsub().join(TOPIC).await?;

        nodes[0].pubsub().publish(TOPIC, b"block-1".to_vec()).await?;

        let message = timeout(Duration::from_secs(2), rx.recv())
            .await?
            .expect("handler alive");
        assert_eq!(message.data, b"block-1");
        assert_eq!(
            nodes[1].pubsub().subscribe(TOPIC, 0).await.unwrap_err(),
            PubSubError::AlreadySubscribed(TOPIC.to_string())
        );

        root.cancel();
        Ok(())
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    #[tokio::test]
    async fn test_unsubscribed_member_stops_receiving() -> anyhow::Result<()> {
        let network = MemoryNetwork::new();
        let root = CancellationToken::new();
        let nodes = test_group(&network, 3, &root).await?;
        let leaving = nodes[1].pubsub().subscribe(TOPIC, 0).await?;
        let staying = nodes[2].pubsub().subscribe(TOPIC, 0).await?;
        nodes[0].pubsub().join(TOPIC).await?;

        nodes[1].pubsub().unsubscribe(TOPIC).await?;
        nodes[0].pubsub().publish(TOPIC, vec![7]).await?;

        let got = timeout(Duration::from_secs(2), staying.recv())
            .await?
            .expect("subscription open");
        assert_eq!(got.data, vec![7]);
        assert_eq!(timeout(Duration::from_secs(1), leaving.recv()).await?, None);
        assert!(nodes[1].pubsub().get_topic(TOPIC).await.is_none());

        root.cancel();
        Ok(())
    }

    #[tokio::test]
    async fn test_closed_node_refuses_pubsub() -> anyhow::Result<()> {
        let network = MemoryNetwork::new();
        let root = CancellationToken::new();
        let nodes = test_group(&network, 2, &root).await?;
        let sub = nodes[0].pubsub().subscribe(TOPIC, 0).await?;

        nodes[0].close().await?;

        assert_eq!(timeout(Duration::from_secs(1), sub.recv()).await?, None);
        assert_eq!(
            nodes[0].pubsub().subscribe("other", 0).await.unwrap_err(),
            PubSubError::Closed
        );
        assert!(nodes[0].pubsub().topics().await.is_empty());

        root.cancel();
        Ok(())
    }
}
