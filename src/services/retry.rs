//! Generalized retry-with-backoff, parameterized over the caller's own
//! retriability test. Default backoff is 2s, 4s, 8s for a `max_retries = 3`
//! post-level comment fetch; the caller decides whether an error is
//! retriable at all.

use std::time::Duration;
use tokio::time::sleep;

use crate::{AppError, Result};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay_secs: u64,
    pub backoff_factor: u32,
}

impl RetryPolicy {
    pub fn from_scraper_config(max_retries: u32, backoff_factor: u32) -> Self {
        Self {
            max_retries,
            initial_delay_secs: 2,
            backoff_factor,
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.max(1).pow(attempt.saturating_sub(1));
        Duration::from_secs(self.initial_delay_secs.saturating_mul(factor as u64))
    }
}

/// Runs `operation` up to `policy.max_retries` times. Only retries when
/// `AppError::is_retriable()` is true for the returned error; a
/// non-retriable error (403, 404, auth failure) is returned immediately
/// on the first attempt: logged and abandoned rather than retried.
pub async fn retry_with_backoff<F, Fut, T>(operation: F, policy: &RetryPolicy) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_error = AppError::InternalError("retry loop never ran".to_string());

    for attempt in 1..=policy.max_retries {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "retry succeeded");
                }
                return Ok(value);
            }
            Err(e) => {
                if !e.is_retriable() {
                    tracing::warn!(error = %e, "non-retriable error, abandoning");
                    return Err(e);
                }
                last_error = e;
                if attempt < policy.max_retries {
                    let delay = policy.delay_for_attempt(attempt);
                    tracing::warn!(attempt, delay_secs = delay.as_secs(), error = %last_error, "retriable error, backing off");
                    sleep(delay).await;
                }
            }
        }
    }

    tracing::error!(max_retries = policy.max_retries, error = %last_error, "all retry attempts exhausted");
    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_ok() {
        let policy = RetryPolicy { max_retries: 3, initial_delay_secs: 0, backoff_factor: 2 };
        let calls = AtomicU32::new(0);
        let result: Result<u32> = retry_with_backoff(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            },
            &policy,
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abandons_immediately_on_non_retriable_error() {
        let policy = RetryPolicy { max_retries: 3, initial_delay_secs: 0, backoff_factor: 2 };
        let calls = AtomicU32::new(0);
        let result: Result<u32> = retry_with_backoff(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::AuthFailure("banned".to_string()))
            },
            &policy,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_up_to_max() {
        let policy = RetryPolicy { max_retries: 3, initial_delay_secs: 0, backoff_factor: 2 };
        let calls = AtomicU32::new(0);
        let result: Result<u32> = retry_with_backoff(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::TransientTransport("timeout".to_string()))
            },
            &policy,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
