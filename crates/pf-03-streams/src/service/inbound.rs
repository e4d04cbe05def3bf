//! Responder side.

use bytes::Bytes;
use facade_telemetry::{
    metric_inc, STREAMS_IN, STREAMS_IN_ACTIVE, STREAMS_IN_FAILED, STREAMS_IN_SUCCESS,
};
use futures::future::FutureExt;
use shared_types::{P2pStream, PeerId, StreamHandler};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::domain::{StreamConfig, StreamError, StreamPhase};
use crate::service::framing::{
    frame, read_frame, shutdown_write, write_frame, ActiveGauge, FramedStream,
};

/// The first message of an inbound stream and the means to answer it.
///
/// Dropping it without calling [`close`](Self::close) resets the stream.
pub struct InboundRequest {
    data: Bytes,
    remote: PeerId,
    protocol: String,
    config: StreamConfig,
    framed: FramedStream,
    _active: ActiveGauge,
}

/// Read the request frame from a freshly accepted stream.
///
/// On failure the stream is released before returning.
pub async fn handle_stream(
    stream: P2pStream,
    config: &StreamConfig,
) -> Result<InboundRequest, StreamError> {
    let protocol = stream.protocol().to_string();
    let remote = stream.remote_peer();
    let active = ActiveGauge::enter(&STREAMS_IN_ACTIVE, &protocol);
    metric_inc!(STREAMS_IN, &[&protocol]);

    let mut framed = frame(stream, config.max_frame_len);
    let data = match read_frame(&mut framed, config.timeout).await {
        Ok(data) => data,
        Err(e) => {
            metric_inc!(STREAMS_IN_FAILED, &[&protocol, StreamPhase::Read.as_str()]);
            debug!(protocol = %protocol, peer = %remote.short(), error = %e, "Inbound stream read failed");
            return Err(e);
        }
    };

    Ok(InboundRequest {
        data,
        remote,
        protocol,
        config: *config,
        framed,
        _active: active,
    })
}

impl fmt::Debug for InboundRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundRequest")
            .field("remote", &self.remote)
            .field("protocol", &self.protocol)
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl InboundRequest {
    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    #[must_use]
    pub fn remote_peer(&self) -> PeerId {
        self.remote
    }

    #[must_use]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Write one response frame under the write deadline.
    pub async fn respond(&mut self, data: impl Into<Bytes>) -> Result<(), StreamError> {
        match write_frame(&mut self.framed, data.into(), self.config.timeout).await {
            Ok(()) => {
                metric_inc!(STREAMS_IN_SUCCESS, &[&self.protocol]);
                Ok(())
            }
            Err(e) => {
                metric_inc!(STREAMS_IN_FAILED, &[&self.protocol, StreamPhase::Write.as_str()]);
                Err(e)
            }
        }
    }

    /// Flush and close the stream.
    pub async fn close(mut self) -> Result<(), StreamError> {
        let closed = shutdown_write(&mut self.framed, StreamPhase::Close, self.config.timeout).await;
        if closed.is_err() {
            metric_inc!(STREAMS_IN_FAILED, &[&self.protocol, StreamPhase::Close.as_str()]);
        }
        closed
    }
}

/// Build a host stream handler around a request/response function.
///
/// `respond_with` receives the sender and the request payload; a `Some`
/// result is written back as the response. The stream is closed afterwards
/// either way.
pub fn request_handler<F, Fut>(config: StreamConfig, respond_with: F) -> StreamHandler
where
    F: Fn(PeerId, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Bytes>> + Send + 'static,
{
    let respond_with = Arc::new(respond_with);
    Arc::new(move |stream: P2pStream| {
        let respond_with = Arc::clone(&respond_with);
        async move {
            let Ok(mut request) = handle_stream(stream, &config).await else {
                return;
            };
            let response = respond_with(request.remote_peer(), request.data().clone()).await;
            if let Some(response) = response {
                if let Err(e) = request.respond(response).await {
                    debug!(protocol = %request.protocol(), error = %e, "Inbound stream respond failed");
                }
            }
            if let Err(e) = request.close().await {
                debug!(error = %e, "Inbound stream close failed");
            }
        }
        .boxed()
    })
}
