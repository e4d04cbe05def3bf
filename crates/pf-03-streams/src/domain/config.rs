use std::time::Duration;

/// Per-phase deadline when the caller does not pick one.
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(15);

/// Largest frame accepted or sent (4 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Applied independently to open, write, close-write and read.
    pub timeout: Duration,
    pub max_frame_len: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_STREAM_TIMEOUT,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl StreamConfig {
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: if timeout.is_zero() {
                DEFAULT_STREAM_TIMEOUT
            } else {
                timeout
            },
            ..Self::default()
        }
    }

    #[must_use]
    pub fn for_testing() -> Self {
        Self::with_timeout(Duration::from_secs(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_timeout_means_default() {
        assert_eq!(StreamConfig::with_timeout(Duration::ZERO).timeout, Duration::from_secs(15));
        assert_eq!(StreamConfig::for_testing().timeout, Duration::from_secs(2));
    }
}
