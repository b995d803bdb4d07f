//! Bounded retry with optional exponential backoff.
//!
//! A target with `retry_attempts = k` gets at most `k + 1` sequential
//! attempts. Attempts never overlap: the next one starts only after the
//! previous one has returned. Backoff is off by default, so retries follow
//! each other immediately unless a [`Backoff`] is configured.
//!
//! # Example
//!
//! ```rust
//! use status_relay_runtime::retry::{Backoff, RetryPolicy, retry_with_backoff};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let policy = RetryPolicy::new(2).with_backoff(
//!     Backoff::exponential(Duration::from_millis(50))
//!         .with_max_delay(Duration::from_secs(2)),
//! );
//!
//! let result = retry_with_backoff(&policy, |_attempt| async {
//!     Ok::<_, String>(42)
//! })
//! .await;
//!
//! assert_eq!(result.map(|ok| ok.value), Ok(42));
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

/// Delay schedule between attempts.
///
/// # Default Values
///
/// - `initial_delay`: 0 (retry immediately)
/// - `max_delay`: 30 seconds
/// - `multiplier`: 2.0 (delay doubles each retry)
/// - `jitter`: false
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backoff {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap for exponential growth
    pub max_delay: Duration,
    /// Growth factor per retry
    pub multiplier: f64,
    /// Scale each delay by a random factor in `[0.5, 1.0]`
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::none()
    }
}

impl Backoff {
    /// No delay between attempts.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: false,
        }
    }

    /// Exponential backoff starting at `initial_delay`.
    #[must_use]
    pub const fn exponential(initial_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: false,
        }
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub const fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `retry` (0-indexed).
    ///
    /// `delay = min(initial_delay * multiplier^retry, max_delay)`, optionally
    /// scaled by jitter.
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }

        #[allow(clippy::cast_possible_wrap)]
        let base_secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(retry.min(64) as i32);
        let capped_secs = base_secs.min(self.max_delay.as_secs_f64());

        let final_secs = if self.jitter {
            use rand::Rng;
            capped_secs * rand::thread_rng().gen_range(0.5..=1.0)
        } else {
            capped_secs
        };

        Duration::from_secs_f64(final_secs)
    }
}

/// Attempt budget plus backoff schedule for one target.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure
    pub max_retries: u32,
    /// Delay schedule
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Policy with `max_retries` extra attempts and no backoff.
    #[must_use]
    pub const fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::none(),
        }
    }

    /// Replace the backoff schedule.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Total attempts allowed.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// An operation that eventually succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Succeeded<T> {
    /// The operation's value
    pub value: T,
    /// Attempts used, including the successful one
    pub attempts: u32,
}

/// An operation that failed on every allowed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhausted<E> {
    /// Error of the final attempt
    pub last_error: E,
    /// Attempts made
    pub attempts: u32,
}

/// Retry an async operation until it succeeds or the budget runs out.
///
/// The operation receives the 1-based attempt number.
///
/// # Errors
///
/// Returns [`Exhausted`] carrying the last attempt's error once
/// `policy.max_attempts()` attempts have failed.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<Succeeded<T>, Exhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "Operation succeeded after retry");
                }
                return Ok(Succeeded {
                    value,
                    attempts: attempt,
                });
            }
            Err(err) => {
                if attempt >= max_attempts {
                    tracing::warn!(
                        attempt,
                        error = %err,
                        "Operation failed after max retries"
                    );
                    return Err(Exhausted {
                        last_error: err,
                        attempts: attempt,
                    });
                }

                let delay = policy.backoff.delay_for_retry(attempt - 1);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Operation failed, retrying..."
                );

                if !delay.is_zero() {
                    sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn no_backoff_is_the_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.backoff.delay_for_retry(0), Duration::ZERO);
        assert_eq!(policy.backoff.delay_for_retry(5), Duration::ZERO);
    }

    #[test]
    fn exponential_delay_calculation() {
        let backoff = Backoff::exponential(Duration::from_millis(100))
            .with_multiplier(2.0)
            .with_max_delay(Duration::from_secs(10));

        assert_eq!(backoff.delay_for_retry(0), Duration::from_millis(100));
        assert_eq!(backoff.delay_for_retry(1), Duration::from_millis(200));
        assert_eq!(backoff.delay_for_retry(2), Duration::from_millis(400));
        assert_eq!(backoff.delay_for_retry(3), Duration::from_millis(800));
    }

    #[test]
    fn exponential_delay_is_capped() {
        let backoff = Backoff::exponential(Duration::from_millis(1000))
            .with_multiplier(10.0)
            .with_max_delay(Duration::from_secs(2));

        assert_eq!(backoff.delay_for_retry(5), Duration::from_secs(2));
        assert_eq!(backoff.delay_for_retry(u32::MAX), Duration::from_secs(2));
    }

    #[test]
    fn jitter_stays_within_half_to_full_delay() {
        let backoff = Backoff::exponential(Duration::from_millis(400)).with_jitter(true);
        for _ in 0..50 {
            let delay = backoff.delay_for_retry(0);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(400));
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_try() {
        let counter = Arc::new(AtomicU32::new(0));

        let result = retry_with_backoff(&RetryPolicy::new(3), |_| {
            let c = Arc::clone(&counter);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(42)
            }
        })
        .await;

        assert_eq!(result, Ok(Succeeded { value: 42, attempts: 1 }));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_failures() {
        let result = retry_with_backoff(&RetryPolicy::new(3), |attempt| async move {
            if attempt < 3 {
                Err(format!("Attempt {attempt} failed"))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result, Ok(Succeeded { value: 42, attempts: 3 }));
    }

    #[tokio::test]
    async fn exhausts_with_the_last_error() {
        let counter = Arc::new(AtomicU32::new(0));

        let result = retry_with_backoff(&RetryPolicy::new(2), |attempt| {
            let c = Arc::clone(&counter);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(format!("failure {attempt}"))
            }
        })
        .await;

        assert_eq!(
            result,
            Err(Exhausted {
                last_error: "failure 3".to_string(),
                attempts: 3
            })
        );
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_retries_means_exactly_one_attempt() {
        let counter = Arc::new(AtomicU32::new(0));

        let result = retry_with_backoff(&RetryPolicy::new(0), |_| {
            let c = Arc::clone(&counter);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("down")
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_between_attempts() {
        let policy = RetryPolicy::new(2).with_backoff(Backoff::exponential(Duration::from_secs(1)));
        let started = tokio::time::Instant::now();

        let result = retry_with_backoff(&policy, |_| async { Err::<(), _>("down") }).await;

        assert!(result.is_err());
        // 1s + 2s
        assert!(started.elapsed() >= Duration::from_secs(3));
    }
}
