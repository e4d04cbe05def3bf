//! Per-peer exponential backoff.
//!
//! Pure bookkeeping: callers pass `now` in, nothing here sleeps or dials.

use lru::LruCache;
use shared_types::PeerId;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use super::config::ConnectorConfig;

/// Delay schedule after consecutive failures.
///
/// Failure `k` (1-based) waits `min(high, low * base^(k-1))`, so the
/// defaults give 10s, 20s, 40s, ... capped at 30m.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub low: Duration,
    pub high: Duration,
    pub base: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            low: Duration::from_secs(10),
            high: Duration::from_secs(30 * 60),
            base: 2.0,
        }
    }
}

impl BackoffPolicy {
    #[must_use]
    pub fn delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let secs = self.low.as_secs_f64() * self.base.powi(exponent);
        if !secs.is_finite() || secs >= self.high.as_secs_f64() {
            return self.high;
        }
        Duration::from_secs_f64(secs)
    }
}

/// Backoff clock for one peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackoffState {
    /// Consecutive failed attempts since the last success.
    pub failures: u32,
    /// Earliest instant a new attempt may start.
    pub next_eligible: Option<Instant>,
    /// An attempt is currently running.
    pub in_flight: bool,
}

/// Outcome of asking the cache whether a peer may be dialed now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialDecision {
    /// Go ahead; the peer is now marked in flight.
    Dial,
    /// Another attempt for this peer has not finished yet.
    InFlight,
    /// Still waiting out the backoff window.
    BackingOff { remaining: Duration },
}

/// LRU-bounded map of backoff clocks, one per peer id.
#[derive(Debug)]
pub struct BackoffCache {
    entries: LruCache<PeerId, BackoffState>,
    policy: BackoffPolicy,
}

impl BackoffCache {
    #[must_use]
    pub fn new(policy: BackoffPolicy, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            policy,
        }
    }

    #[must_use]
    pub fn from_config(config: &ConnectorConfig) -> Self {
        Self::new(config.policy(), config.cache_size)
    }

    /// Check eligibility and, on `Dial`, mark the peer in flight.
    pub fn begin_attempt(&mut self, peer: PeerId, now: Instant) -> DialDecision {
        if let Some(state) = self.entries.get_mut(&peer) {
            if state.in_flight {
                return DialDecision::InFlight;
            }
            if let Some(next) = state.next_eligible {
                if now < next {
                    return DialDecision::BackingOff {
                        remaining: next - now,
                    };
                }
            }
            state.in_flight = true;
            return DialDecision::Dial;
        }

        self.entries.push(
            peer,
            BackoffState {
                in_flight: true,
                ..BackoffState::default()
            },
        );
        DialDecision::Dial
    }

    /// A successful connection resets the clock entirely.
    pub fn record_success(&mut self, peer: &PeerId) {
        self.entries.pop(peer);
    }

    /// Record a failed attempt and return the delay until the next one.
    pub fn record_failure(&mut self, peer: PeerId, now: Instant) -> Duration {
        let policy = self.policy;
        let state = self.entries.get_or_insert_mut(peer, BackoffState::default);
        state.failures = state.failures.saturating_add(1);
        state.in_flight = false;
        let delay = policy.delay(state.failures);
        state.next_eligible = Some(now + delay);
        delay
    }

    /// Attempt abandoned without an outcome (shutdown); keep the clock as is.
    pub fn abandon(&mut self, peer: &PeerId) {
        if let Some(state) = self.entries.get_mut(peer) {
            state.in_flight = false;
        }
    }

    #[must_use]
    pub fn state(&self, peer: &PeerId) -> Option<&BackoffState> {
        self.entries.peek(peer)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }
}
