//! Frame-level I/O shared by both sides, each step under a deadline.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use prometheus::{IntGauge, IntGaugeVec};
use shared_types::P2pStream;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::domain::{StreamError, StreamPhase};

pub(crate) type FramedStream = Framed<P2pStream, LengthDelimitedCodec>;

pub(crate) fn frame(stream: P2pStream, max_frame_len: usize) -> FramedStream {
    let mut codec = LengthDelimitedCodec::new();
    codec.set_max_frame_length(max_frame_len);
    Framed::new(stream, codec)
}

pub(crate) async fn read_frame(
    framed: &mut FramedStream,
    deadline: Duration,
) -> Result<Bytes, StreamError> {
    match timeout(deadline, framed.next()).await {
        Ok(Some(Ok(frame))) => Ok(frame.freeze()),
        Ok(Some(Err(e))) => Err(StreamError::io(StreamPhase::Read, e)),
        Ok(None) => Err(StreamError::Closed {
            phase: StreamPhase::Read,
        }),
        Err(_) => Err(StreamError::Timeout {
            phase: StreamPhase::Read,
        }),
    }
}

pub(crate) async fn write_frame(
    framed: &mut FramedStream,
    data: Bytes,
    deadline: Duration,
) -> Result<(), StreamError> {
    let max = framed.codec().max_frame_length();
    if data.len() > max {
        return Err(StreamError::FrameTooLarge {
            len: data.len(),
            max,
        });
    }
    match timeout(deadline, framed.send(data)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(StreamError::io(StreamPhase::Write, e)),
        Err(_) => Err(StreamError::Timeout {
            phase: StreamPhase::Write,
        }),
    }
}

/// Flush and shut down our write half. Reading stays possible.
pub(crate) async fn shutdown_write(
    framed: &mut FramedStream,
    phase: StreamPhase,
    deadline: Duration,
) -> Result<(), StreamError> {
    match timeout(deadline, SinkExt::<Bytes>::close(framed)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(StreamError::io(phase, e)),
        Err(_) => Err(StreamError::Timeout { phase }),
    }
}

/// Holds a per-protocol "active streams" gauge up while alive.
pub(crate) struct ActiveGauge(IntGauge);

impl ActiveGauge {
    pub(crate) fn enter(gauges: &IntGaugeVec, protocol: &str) -> Self {
        let gauge = gauges.with_label_values(&[protocol]);
        gauge.inc();
        Self(gauge)
    }
}

impl Drop for ActiveGauge {
    fn drop(&mut self) {
        self.0.dec();
    }
}
