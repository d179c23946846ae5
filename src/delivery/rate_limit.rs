//! # Feature: Rate Limit Gate
//!
//! Process-wide "do not send until T" marker shared by every sender using the same
//! transport account. Senders poll it before each attempt; a rate-limit answer from the
//! transport pushes the deadline out. There is no queue, waiters poll.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.0.0: Single global deadline driven by transport rate-limit answers
//! - 1.0.0: Initial release with per-user sliding window rate limiting

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::Clock;

/// Pause applied when the transport gives no retry hint
pub const DEFAULT_LIMIT_BACKOFF: Duration = Duration::from_secs(60);

pub struct RateLimitGate {
    /// Unix milliseconds, 0 when never limited
    blocked_until: AtomicI64,
    default_backoff: Duration,
    clock: Arc<dyn Clock>,
}

impl RateLimitGate {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_default_backoff(clock, DEFAULT_LIMIT_BACKOFF)
    }

    pub fn with_default_backoff(clock: Arc<dyn Clock>, default_backoff: Duration) -> Self {
        RateLimitGate {
            blocked_until: AtomicI64::new(0),
            default_backoff,
            clock,
        }
    }

    /// True while sends must be held back
    pub fn blocked(&self) -> bool {
        self.clock.now().timestamp_millis() < self.blocked_until.load(Ordering::Acquire)
    }

    /// Record a rate-limit answer. A later deadline never gets shortened by an earlier one.
    pub fn record_limit_hit(&self, retry_after: Option<Duration>) {
        let pause = retry_after.unwrap_or(self.default_backoff);
        let until = self.clock.now().timestamp_millis() + pause.as_millis() as i64;
        self.blocked_until.fetch_max(until, Ordering::AcqRel);
    }

    pub fn blocked_until(&self) -> Option<DateTime<Utc>> {
        match self.blocked_until.load(Ordering::Acquire) {
            0 => None,
            millis => DateTime::from_timestamp_millis(millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use chrono::TimeZone;

    fn gate() -> (RateLimitGate, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap());
        (RateLimitGate::new(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_gate_starts_open() {
        let (gate, _) = gate();
        assert!(!gate.blocked());
        assert!(gate.blocked_until().is_none());
    }

    #[test]
    fn test_gate_blocks_until_hint_passes() {
        let (gate, clock) = gate();
        gate.record_limit_hit(Some(Duration::from_secs(10)));
        assert!(gate.blocked());

        clock.advance(chrono::Duration::seconds(9));
        assert!(gate.blocked());

        clock.advance(chrono::Duration::seconds(1));
        assert!(!gate.blocked());
    }

    #[test]
    fn test_gate_uses_default_without_hint() {
        let (gate, clock) = gate();
        gate.record_limit_hit(None);

        clock.advance(chrono::Duration::seconds(59));
        assert!(gate.blocked());
        clock.advance(chrono::Duration::seconds(1));
        assert!(!gate.blocked());
    }

    #[test]
    fn test_gate_keeps_later_deadline() {
        let (gate, clock) = gate();
        gate.record_limit_hit(Some(Duration::from_secs(30)));
        gate.record_limit_hit(Some(Duration::from_secs(5)));

        clock.advance(chrono::Duration::seconds(10));
        assert!(gate.blocked());
    }

    #[tokio::test]
    async fn test_gate_shared_between_tasks() {
        let (gate, clock) = gate();
        let gate = Arc::new(gate);
        gate.record_limit_hit(Some(Duration::from_secs(5)));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move { gate.blocked() }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        clock.advance(chrono::Duration::seconds(5));
        assert!(!gate.blocked());
    }
}
