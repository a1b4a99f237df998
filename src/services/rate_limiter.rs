//! Rate-Limit Oracle. A passive snapshot of per-OAuth-app quota, updated
//! only by the counting transport — it issues no HTTP calls of its own.
//! One instance per OAuth app, owned exclusively by the worker that uses
//! that app.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tokio::time::{sleep, Duration};

#[derive(Debug, Clone, Copy)]
pub struct RateLimitSnapshot {
    pub remaining: u32,
    pub used: u32,
    pub reset_at: DateTime<Utc>,
}

impl Default for RateLimitSnapshot {
    fn default() -> Self {
        // Optimistic default before the first response header arrives.
        Self { remaining: 600, used: 0, reset_at: Utc::now() }
    }
}

pub struct RateLimitOracle {
    threshold: u32,
    snapshot: Mutex<RateLimitSnapshot>,
}

impl RateLimitOracle {
    pub fn new(threshold: u32) -> Self {
        Self { threshold, snapshot: Mutex::new(RateLimitSnapshot::default()) }
    }

    /// Called by the HTTP counter after every response.
    pub fn observe(&self, snapshot: RateLimitSnapshot) {
        *self.snapshot.lock().unwrap() = snapshot;
    }

    pub fn snapshot(&self) -> RateLimitSnapshot {
        *self.snapshot.lock().unwrap()
    }

    /// Blocks until it is safe to issue the next request. If
    /// `remaining >= threshold`, returns immediately; otherwise sleeps
    /// until `reset_at + 5s`.
    pub async fn await_capacity(&self) {
        let snapshot = self.snapshot();
        if snapshot.remaining >= self.threshold {
            return;
        }

        let now = Utc::now();
        let guard_until = snapshot.reset_at + chrono::Duration::seconds(5);
        if guard_until <= now {
            return;
        }

        let wait = (guard_until - now).to_std().unwrap_or(Duration::from_secs(0));
        tracing::warn!(
            remaining = snapshot.remaining,
            threshold = self.threshold,
            wait_secs = wait.as_secs(),
            "rate limit below threshold, blocking until reset"
        );
        sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_immediately_when_above_threshold() {
        let oracle = RateLimitOracle::new(50);
        oracle.observe(RateLimitSnapshot { remaining: 100, used: 0, reset_at: Utc::now() });
        let start = std::time::Instant::now();
        oracle.await_capacity().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn blocks_past_reset_plus_guard_when_below_threshold() {
        let oracle = RateLimitOracle::new(50);
        oracle.observe(RateLimitSnapshot {
            remaining: 10,
            used: 90,
            reset_at: Utc::now() + chrono::Duration::milliseconds(50),
        });
        let start = std::time::Instant::now();
        oracle.await_capacity().await;
        // reset_at (+50ms) + 5s guard
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
