//! Retry policy with capped exponential backoff.

use std::future::Future;
use std::time::Duration;

use crate::error::{ApiError, Result};

/// Default number of retries after the first attempt.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry.
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Default upper bound for any single wait.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Decides whether and when a failed attempt is repeated.
///
/// Only errors for which [`ApiError::is_retryable`] holds are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::module_name_repetitions)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    max_retries: u32,
    /// Delay before the first retry; doubles each time.
    base_delay: Duration,
    /// Cap for a single delay.
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl RetryPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    /// Retries after the first attempt.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Backoff before retry number `retry` (0-based): `base * 2^retry`, capped.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Wait before retrying after `err`. A server-supplied `Retry-After` extends it.
    fn wait_after(&self, err: &ApiError, retry: u32) -> Duration {
        let backoff = self.delay_for(retry);
        match err {
            ApiError::RateLimit {
                retry_after: Some(secs),
                ..
            } => backoff.max(Duration::from_secs(*secs).min(self.max_delay)),
            _ => backoff,
        }
    }

    /// Runs `operation` until it succeeds, fails terminally, or the budget is spent.
    ///
    /// `operation` receives the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or the last error once all retries
    /// are used.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0u32;
        loop {
            let attempt = retries.saturating_add(1);
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && retries < self.max_retries => {
                    let delay = self.wait_after(&err, retries);
                    tracing::warn!(
                        attempt = attempt,
                        max_retries = self.max_retries,
                        error_kind = %err.kind(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retries = retries.saturating_add(1);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;

    fn sample(kind: &str) -> ApiError {
        match kind {
            "network" => ApiError::network(None, "connection reset"),
            "rate_limit" => ApiError::RateLimit {
                retry_after: None,
                limit: None,
                remaining: None,
                reset: None,
            },
            "server" => ApiError::Server {
                status: 503,
                message: String::from("unavailable"),
            },
            "auth" => ApiError::Authentication {
                status: 401,
                message: String::from("bad token"),
            },
            "not_found" => ApiError::not_found("movie", 1),
            _ => ApiError::validation("bad input"),
        }
    }

    /// Fails `failures` times with `kind`, then returns 42.
    async fn flaky(policy: RetryPolicy, kind: &str, failures: u32) -> (Result<u32>, u32) {
        let calls = AtomicU32::new(0);
        let result = policy
            .run(|_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                let err = sample(kind);
                async move { if n < failures { Err(err) } else { Ok(42) } }
            })
            .await;
        (result, calls.load(Ordering::SeqCst))
    }

    #[test]
    fn test_default_schedule() {
        // Arrange
        let policy = RetryPolicy::default();

        // Act & Assert
        assert_eq!(policy.max_retries(), 3);
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(7), Duration::from_secs(10));
        assert_eq!(policy.delay_for(40), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_recover_on_third_attempt() {
        for kind in ["network", "rate_limit", "server"] {
            // Arrange
            let policy = RetryPolicy::default();

            // Act
            let (result, calls) = flaky(policy, kind, 2).await;

            // Assert
            assert_eq!(result.unwrap(), 42, "kind={kind}");
            assert_eq!(calls, 3, "kind={kind}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_errors_fail_after_one_attempt() {
        for kind in ["auth", "not_found", "validation"] {
            // Arrange
            let policy = RetryPolicy::default();

            // Act
            let (result, calls) = flaky(policy, kind, 2).await;

            // Assert
            assert_eq!(result.unwrap_err(), sample(kind), "kind={kind}");
            assert_eq!(calls, 1, "kind={kind}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_is_four_attempts() {
        // Arrange
        let policy = RetryPolicy::default();

        // Act
        let start = Instant::now();
        let (result, calls) = flaky(policy, "network", u32::MAX).await;

        // Assert
        assert_eq!(result.unwrap_err().kind(), crate::error::ErrorKind::Network);
        assert_eq!(calls, 4);
        assert_eq!(start.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_extends_backoff() {
        // Arrange
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        // Act
        let start = Instant::now();
        let result = policy
            .run(|_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(ApiError::RateLimit {
                            retry_after: Some(2),
                            limit: None,
                            remaining: None,
                            reset: None,
                        })
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        // Assert
        assert!(result.is_ok());
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_none_policy_does_not_retry() {
        // Arrange
        let policy = RetryPolicy::none();

        // Act
        let (result, calls) = flaky(policy, "server", 1).await;

        // Assert
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
