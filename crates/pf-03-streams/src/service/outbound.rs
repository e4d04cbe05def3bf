//! Requester side.

use bytes::Bytes;
use facade_telemetry::{
    metric_inc, STREAMS_OUT, STREAMS_OUT_ACTIVE, STREAMS_OUT_FAILED, STREAMS_OUT_SUCCESS,
};
use shared_types::{NetworkHost, PeerId, ProtocolId};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::{StreamConfig, StreamError, StreamPhase};
use crate::service::framing::{frame, read_frame, shutdown_write, write_frame, ActiveGauge};

/// Send `data` to `peer` over a fresh stream and wait for one response.
///
/// Open, write, close-write and read each get `config.timeout`. Cancelling
/// `cancel` abandons the exchange and resets the stream.
pub async fn request(
    host: &dyn NetworkHost,
    peer: &PeerId,
    protocol: &ProtocolId,
    data: impl Into<Bytes>,
    config: &StreamConfig,
    cancel: &CancellationToken,
) -> Result<Bytes, StreamError> {
    let _active = ActiveGauge::enter(&STREAMS_OUT_ACTIVE, protocol.as_str());
    let data = data.into();

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StreamError::Cancelled),
        result = exchange(host, peer, protocol, data, config) => result,
    };

    match &result {
        Ok(_) => metric_inc!(STREAMS_OUT_SUCCESS, &[protocol.as_str()]),
        Err(e) => {
            if let Some(phase) = e.phase() {
                metric_inc!(STREAMS_OUT_FAILED, &[protocol.as_str(), phase.as_str()]);
            }
            debug!(protocol = %protocol, peer = %peer.short(), error = %e, "Stream request failed");
        }
    }
    result
}

async fn exchange(
    host: &dyn NetworkHost,
    peer: &PeerId,
    protocol: &ProtocolId,
    data: Bytes,
    config: &StreamConfig,
) -> Result<Bytes, StreamError> {
    let stream = timeout(config.timeout, host.new_stream(peer, protocol))
        .await
        .map_err(|_| StreamError::Timeout {
            phase: StreamPhase::Open,
        })??;
    metric_inc!(STREAMS_OUT, &[protocol.as_str()]);

    // The framed stream is dropped on every return below
    let mut framed = frame(stream, config.max_frame_len);
    write_frame(&mut framed, data, config.timeout).await?;
    shutdown_write(&mut framed, StreamPhase::CloseWrite, config.timeout).await?;
    read_frame(&mut framed, config.timeout).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::inbound::request_handler;
    use facade_telemetry::{STREAMS_IN_ACTIVE, STREAMS_OUT_ACTIVE};
    use mem_network::MemoryNetwork;
    use std::time::Duration;

    fn echo(config: StreamConfig) -> shared_types::StreamHandler {
        request_handler(config, |_, data| async move { Some(data) })
    }

    fn silent(config: StreamConfig) -> shared_types::StreamHandler {
        request_handler(config, |_, _| std::future::pending::<Option<Bytes>>())
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        let network = MemoryNetwork::new();
        let a = network.add_host();
        let b = network.add_host();
        let protocol = ProtocolId::from("/pf03/echo-unit");
        let config = StreamConfig::for_testing();
        b.set_stream_handler(protocol.clone(), echo(config));

        let response = request(
            a.as_ref(),
            &b.local_peer_id(),
            &protocol,
            b"ping".to_vec(),
            &config,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(&response[..], b"ping");
        assert_eq!(STREAMS_OUT_ACTIVE.with_label_values(&[protocol.as_str()]).get(), 0);
        assert_eq!(STREAMS_OUT_SUCCESS.with_label_values(&[protocol.as_str()]).get(), 1);
    }

    #[tokio::test]
    async fn test_empty_payload_round_trip() {
        let network = MemoryNetwork::new();
        let a = network.add_host();
        let b = network.add_host();
        let protocol = ProtocolId::from("/pf03/echo-empty");
        let config = StreamConfig::for_testing();
        b.set_stream_handler(protocol.clone(), echo(config));

        let response = request(
            a.as_ref(),
            &b.local_peer_id(),
            &protocol,
            Bytes::new(),
            &config,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(response.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_responder_times_out_on_read() {
        let network = MemoryNetwork::new();
        let a = network.add_host();
        let b = network.add_host();
        let protocol = ProtocolId::from("/pf03/silent-unit");
        let config = StreamConfig::for_testing();
        b.set_stream_handler(protocol.clone(), silent(config));

        let started = tokio::time::Instant::now();
        let err = request(
            a.as_ref(),
            &b.local_peer_id(),
            &protocol,
            b"ping".to_vec(),
            &config,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(err, StreamError::Timeout { phase: StreamPhase::Read });
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(
            STREAMS_OUT_FAILED
                .with_label_values(&[protocol.as_str(), "read"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_unsupported_protocol_fails_open() {
        let network = MemoryNetwork::new();
        let a = network.add_host();
        let b = network.add_host();
        let protocol = ProtocolId::from("/pf03/missing");

        let err = request(
            a.as_ref(),
            &b.local_peer_id(),
            &protocol,
            b"x".to_vec(),
            &StreamConfig::for_testing(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, StreamError::Open(_)));
        assert_eq!(err.phase(), Some(StreamPhase::Open));
    }

    #[tokio::test]
    async fn test_oversized_request_is_refused() {
        let network = MemoryNetwork::new();
        let a = network.add_host();
        let b = network.add_host();
        let protocol = ProtocolId::from("/pf03/oversized");
        let config = StreamConfig {
            max_frame_len: 4,
            ..StreamConfig::for_testing()
        };
        b.set_stream_handler(protocol.clone(), echo(config));

        let err = request(
            a.as_ref(),
            &b.local_peer_id(),
            &protocol,
            b"too long".to_vec(),
            &config,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(err, StreamError::FrameTooLarge { len: 8, max: 4 });
    }

    #[tokio::test]
    async fn test_cancel_abandons_request() {
        let network = MemoryNetwork::new();
        let a = network.add_host();
        let b = network.add_host();
        let protocol = ProtocolId::from("/pf03/cancelled");
        let config = StreamConfig::for_testing();
        b.set_stream_handler(protocol.clone(), silent(config));
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });
        let err = request(a.as_ref(), &b.local_peer_id(), &protocol, b"x".to_vec(), &config, &cancel)
            .await
            .unwrap_err();

        assert_eq!(err, StreamError::Cancelled);
        assert_eq!(STREAMS_OUT_ACTIVE.with_label_values(&[protocol.as_str()]).get(), 0);
        assert_eq!(STREAMS_IN_ACTIVE.with_label_values(&[protocol.as_str()]).get(), 1);
    }
}
