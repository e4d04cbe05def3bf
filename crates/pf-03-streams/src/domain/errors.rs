use shared_types::HostError;
use std::fmt;
use thiserror::Error;

/// Step of a request/response exchange. Doubles as the `err` metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamPhase {
    Open,
    Read,
    Write,
    CloseWrite,
    Close,
}

impl StreamPhase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamPhase::Open => "open",
            StreamPhase::Read => "read",
            StreamPhase::Write => "write",
            StreamPhase::CloseWrite => "close_write",
            StreamPhase::Close => "close",
        }
    }
}

impl fmt::Display for StreamPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("stream {phase} timed out")]
    Timeout { phase: StreamPhase },

    #[error("stream {phase} failed: {reason}")]
    Io { phase: StreamPhase, reason: String },

    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// The remote end finished before sending a frame.
    #[error("stream closed by remote during {phase}")]
    Closed { phase: StreamPhase },

    #[error("could not open stream: {0}")]
    Open(#[from] HostError),

    #[error("request cancelled")]
    Cancelled,
}

impl StreamError {
    /// Phase the error belongs to, if any.
    #[must_use]
    pub fn phase(&self) -> Option<StreamPhase> {
        match self {
            StreamError::Timeout { phase }
            | StreamError::Io { phase, .. }
            | StreamError::Closed { phase } => Some(*phase),
            StreamError::FrameTooLarge { .. } => Some(StreamPhase::Write),
            StreamError::Open(_) => Some(StreamPhase::Open),
            StreamError::Cancelled => None,
        }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, StreamError::Timeout { .. })
    }

    pub(crate) fn io(phase: StreamPhase, err: std::io::Error) -> Self {
        StreamError::Io {
            phase,
            reason: err.to_string(),
        }
    }
}
