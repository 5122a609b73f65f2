//! Shared rate-limit state and retry backoff.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::response::RateLimitNode;

/// Slack added after a provider reset time before sending again.
pub const RESET_GRACE: Duration = Duration::from_secs(1);

/// How long to wait from `now` until `reset_at` has passed, plus grace.
pub fn until_reset(reset_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (reset_at - now).to_std().unwrap_or(Duration::ZERO) + RESET_GRACE
}

/// Pause shared by every request of one client.
///
/// When any request learns that the quota is exhausted, all requests hold off
/// until the reset instead of each discovering the limit on its own.
#[derive(Debug, Default)]
pub struct RateBudget {
    paused_until: Mutex<Option<Instant>>,
}

impl RateBudget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep while a pause is in effect.
    pub async fn wait_turn(&self) {
        let until = *self.paused_until.lock().await;
        if let Some(until) = until {
            if until > Instant::now() {
                tokio::time::sleep_until(until).await;
            }
        }
    }

    /// Hold off all requests for `duration`. Never shortens an existing pause.
    pub async fn pause_for(&self, duration: Duration) {
        let target = Instant::now() + duration;
        let mut guard = self.paused_until.lock().await;
        match *guard {
            Some(existing) if existing >= target => {}
            _ => *guard = Some(target),
        }
    }

    /// Pause proactively when a successful response reports an empty quota.
    /// Returns the pause applied, if any.
    pub async fn observe(&self, rate: &RateLimitNode, now: DateTime<Utc>) -> Option<Duration> {
        if rate.remaining > 0 {
            return None;
        }
        let wait = until_reset(rate.reset_at, now);
        self.pause_for(wait).await;
        Some(wait)
    }
}

/// Exponential backoff for transient failures.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    /// Delay before retry number `attempt` (zero-based): `base * 2^attempt`, capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let backoff = Backoff {
            base: Duration::from_millis(500),
            max: Duration::from_secs(60),
        };
        assert_eq!(backoff.delay(0), Duration::from_millis(500));
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(3), Duration::from_secs(4));
        assert_eq!(backoff.delay(20), Duration::from_secs(60));
        assert_eq!(backoff.delay(200), Duration::from_secs(60));
    }

    #[test]
    fn test_until_reset_adds_grace_and_never_negative() {
        let now = Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap();
        assert_eq!(
            until_reset(now + chrono::Duration::seconds(30), now),
            Duration::from_secs(31)
        );
        assert_eq!(
            until_reset(now - chrono::Duration::seconds(30), now),
            RESET_GRACE
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_blocks_wait_turn() {
        let budget = RateBudget::new();
        let start = Instant::now();
        budget.wait_turn().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        budget.pause_for(Duration::from_secs(10)).await;
        budget.pause_for(Duration::from_secs(2)).await;
        budget.wait_turn().await;
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_observe_only_pauses_on_empty_quota() {
        let budget = RateBudget::new();
        let now = Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap();
        let healthy = RateLimitNode {
            remaining: 10,
            reset_at: now,
            limit: None,
            cost: None,
        };
        assert_eq!(budget.observe(&healthy, now).await, None);

        let empty = RateLimitNode {
            remaining: 0,
            reset_at: now + chrono::Duration::seconds(5),
            limit: None,
            cost: None,
        };
        assert_eq!(
            budget.observe(&empty, now).await,
            Some(Duration::from_secs(6))
        );
    }
}
