//! # Stream Flows
//!
//! Request/response between group members over the length-prefixed stream
//! protocol, including a responder that never answers and a peer that has
//! left the network.

#[cfg(test)]
mod tests {
    use super::super::test_group;
    use bytes::Bytes;
    use facade_telemetry::{encode_metrics, register_metrics};
    use futures::future::join_all;
    use mem_network::MemoryNetwork;
    use pf_03_streams::{StreamError, StreamPhase};
    use shared_types::{PeerId, ProtocolId};
    use std::time::Duration;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    fn echo() -> ProtocolId {
        ProtocolId::from("/pf/echo/1.0.0")
    }

    #[tokio::test]
    async fn test_echo_both_directions() -> anyhow::Result<()> {
        let network = MemoryNetwork::new();
        let root = CancellationToken::new();
        let nodes = test_group(&network, 2, &root).await?;
        for node in &nodes {
            node.set_request_handler(echo(), |_, data: Bytes| async move { Some(data) });
        }

        let forward = nodes[0]
            .request(&nodes[1].peer_id(), &echo(), Bytes::from_static(b"ping"))
            .await?;
        let backward = nodes[1]
            .request(&nodes[0].peer_id(), &echo(), Bytes::from_static(b"pong"))
            .await?;

        assert_eq!(&forward[..], b"ping");
        assert_eq!(&backward[..], b"pong");
        root.cancel();
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_requests_get_their_own_responses() -> anyhow::Result<()> {
        let network = MemoryNetwork::new();
        let root = CancellationToken::new();
        let nodes = test_group(&network, 2, &root).await?;
        nodes[1].set_request_handler(echo(), |from: PeerId, data: Bytes| async move {
            let mut reply = data.to_vec();
            reply.extend_from_slice(from.short().as_bytes());
            Some(Bytes::from(reply))
        });
        let server = nodes[1].peer_id();
        let suffix = nodes[0].peer_id().short();

        let replies = join_all((0..10u8).map(|i| {
            let node = &nodes[0];
            async move { node.request(&server, &echo(), vec![i]).await }
        }))
        .await;

        for (i, reply) in replies.into_iter().enumerate() {
            let reply = reply?;
            assert_eq!(reply[0] as usize, i);
            assert_eq!(&reply[1..], suffix.as_bytes());
        }
        root.cancel();
        Ok(())
    }

    #[tokio::test]
    async fn test_silent_responder_times_out() -> anyhow::Result<()> {
        let network = MemoryNetwork::new();
        let root = CancellationToken::new();
        let nodes = test_group(&network, 2, &root).await?;
        nodes[1].set_request_handler(echo(), |_, _| std::future::pending::<Option<Bytes>>());
        let started = Instant::now();

        let err = nodes[0]
            .request(&nodes[1].peer_id(), &echo(), Bytes::from_static(b"hello?"))
            .await
            .unwrap_err();

        assert_eq!(err, StreamError::Timeout { phase: StreamPhase::Read });
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(4));
        root.cancel();
        Ok(())
    }

    #[tokio::test]
    async fn test_declined_request_reads_closed_stream() -> anyhow::Result<()> {
        let network = MemoryNetwork::new();
        let root = CancellationToken::new();
        let nodes = test_group(&network, 2, &root).await?;
        nodes[1].set_request_handler(echo(), |_, _| async { None });

        let err = nodes[0]
            .request(&nodes[1].peer_id(), &echo(), Bytes::from_static(b"no"))
            .await
            .unwrap_err();

        assert_eq!(err, StreamError::Closed { phase: StreamPhase::Read });
        root.cancel();
        Ok(())
    }

    #[tokio::test]
    async fn test_request_to_departed_peer_fails_to_open() -> anyhow::Result<()> {
        let network = MemoryNetwork::new();
        let root = CancellationToken::new();
        let nodes = test_group(&network, 2, &root).await?;
        nodes[1].set_request_handler(echo(), |_, data: Bytes| async move { Some(data) });
        nodes[1].close().await?;

        let err = nodes[0]
            .request(&nodes[1].peer_id(), &echo(), Bytes::from_static(b"anyone"))
            .await
            .unwrap_err();

        assert!(matches!(err, StreamError::Open(_)));
        assert_eq!(err.phase(), Some(StreamPhase::Open));
        root.cancel();
        Ok(())
    }

    #[tokio::test]
    async fn test_stream_metrics_are_exported() -> anyhow::Result<()> {
        // May already be registered by another test in this binary
        let _ = register_metrics();
        let network = MemoryNetwork::new();
        let root = CancellationToken::new();
        let nodes = test_group(&network, 2, &root).await?;
        let protocol = ProtocolId::from("/pf/metrics/1.0.0");
        nodes[1].set_request_handler(protocol.clone(), |_, data: Bytes| async move { Some(data) });

        nodes[0]
            .request(&nodes[1].peer_id(), &protocol, Bytes::from_static(b"count me"))
            .await?;

        let text = encode_metrics()?;
        assert!(text.contains("pf_streams_out_success_total"));
        assert!(text.contains("/pf/metrics/1.0.0"));
        root.cancel();
        Ok(())
    }
}
