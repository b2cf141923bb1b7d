//! Token-bucket rate limiter shared by all requests against one API target.

use std::future::Future;
use std::num::NonZeroU32;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Admission control for outgoing requests.
///
/// The token-bucket mode admits at most `rate` operations per second on a sustained
/// basis and lets up to `capacity` operations through at once after an idle period.
/// Callers that find the bucket empty sleep (cooperatively) until their token accrues;
/// the limiter itself never fails.
///
/// The immediate mode admits everything without delay and is meant for tests.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct RateLimiter {
    /// Admission discipline.
    mode: Mode,
}

#[derive(Debug)]
enum Mode {
    TokenBucket(TokenBucket),
    Immediate,
}

/// Bucket tracked as the theoretical arrival time of the next token.
///
/// An empty bucket means `tat` lies `capacity * interval` in the future; a full one
/// means `tat` is at or before now.
#[derive(Debug)]
struct TokenBucket {
    /// Sustained rate.
    rate: NonZeroU32,
    /// Time for one token to accrue.
    interval: Duration,
    /// Burst window: `capacity * interval`.
    burst: Duration,
    /// Theoretical arrival time. Never held across an await.
    tat: Mutex<Instant>,
}

impl TokenBucket {
    fn tat(&self) -> MutexGuard<'_, Instant> {
        self.tat.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A token reserved by a waiting caller.
///
/// Dropped before admission (the waiting future was cancelled), it hands the
/// token back so only admitted work is charged to the bucket.
struct Reservation<'a> {
    bucket: &'a TokenBucket,
    admitted: bool,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.admitted {
            return;
        }
        // A pending reservation always ends at least `burst` ahead of now, so
        // taking one interval back never moves `tat` into the past.
        let mut tat = self.bucket.tat();
        *tat = tat.checked_sub(self.bucket.interval).unwrap_or(*tat);
    }
}

impl RateLimiter {
    /// Creates a token-bucket limiter whose capacity equals one second of tokens.
    #[must_use]
    pub fn token_bucket(requests_per_second: NonZeroU32) -> Self {
        Self::with_capacity(requests_per_second, requests_per_second)
    }

    /// Creates a token-bucket limiter with an explicit burst capacity.
    #[must_use]
    pub fn with_capacity(requests_per_second: NonZeroU32, capacity: NonZeroU32) -> Self {
        let interval = Duration::from_secs(1) / requests_per_second.get();
        Self {
            mode: Mode::TokenBucket(TokenBucket {
                rate: requests_per_second,
                interval,
                burst: interval.saturating_mul(capacity.get()),
                tat: Mutex::new(Instant::now()),
            }),
        }
    }

    /// Creates a limiter that admits every operation immediately.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            mode: Mode::Immediate,
        }
    }

    /// Configured sustained rate, `None` for the immediate limiter.
    #[must_use]
    pub const fn requests_per_second(&self) -> Option<NonZeroU32> {
        match &self.mode {
            Mode::TokenBucket(bucket) => Some(bucket.rate),
            Mode::Immediate => None,
        }
    }

    /// Waits until one unit of work may start, consuming a token.
    ///
    /// Dropping the future while it waits (e.g. under a timeout) returns the
    /// token, so callers that never start do not delay later ones.
    pub async fn acquire(&self) {
        let Mode::TokenBucket(bucket) = &self.mode else {
            return;
        };

        let now = Instant::now();
        let admit_at = {
            let mut tat = bucket.tat();
            let next = (*tat).max(now).checked_add(bucket.interval).unwrap_or(now);
            *tat = next;
            next.checked_sub(bucket.burst).unwrap_or(now)
        };

        if admit_at <= now {
            return;
        }

        let mut reservation = Reservation {
            bucket,
            admitted: false,
        };
        let wait = admit_at.saturating_duration_since(now);
        tracing::debug!(
            wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            "rate limit reached, waiting for token"
        );
        tokio::time::sleep_until(admit_at).await;
        reservation.admitted = true;
    }

    /// Runs `operation` once admitted. Its output is returned untouched.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.acquire().await;
        operation().await
    }
}
