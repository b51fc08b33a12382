//! Bounded retry with exponential backoff and jitter.
//!
//! Wraps one logical fetch. Transient failures are retried with
//! exponentially growing, jittered, capped delays; terminal failures stop
//! immediately. Exhaustion is an ordinary value, never a panic; one
//! source running out of attempts must not disturb the rest of the run.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::fetch::FetchError;

/// Retry policy knobs. Attempt k (1-based) waits
/// `base * 2^(k-1) + jitter ∈ [0, jitter]`, capped at `max_delay`,
/// before attempt k+1.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::utils::constants::DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(crate::utils::constants::DEFAULT_BASE_BACKOFF_MS),
            max_delay: Duration::from_millis(crate::utils::constants::DEFAULT_MAX_BACKOFF_MS),
            jitter: Duration::from_millis(crate::utils::constants::DEFAULT_JITTER_MS),
        }
    }
}

/// What one wrapped operation produced, with the attempt trace the
/// dispatcher records into the run summary.
#[derive(Debug)]
pub struct RetryReport<T> {
    pub outcome: Result<T, FetchError>,
    /// Attempts actually made (1..=max_attempts)
    pub attempts: u32,
    /// Backoff waits taken between attempts, in order
    pub waits: Vec<Duration>,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &crate::config::HarvestConfig) -> Self {
        Self {
            max_attempts: config.max_attempts(),
            base_delay: config.base_backoff(),
            max_delay: config.max_backoff(),
            jitter: config.jitter(),
        }
    }

    /// Deterministic bounds of the wait after attempt `k` (1-based):
    /// `[base * 2^(k-1), base * 2^(k-1) + jitter]`, both capped.
    #[must_use]
    pub fn backoff_bounds(&self, attempt: u32) -> (Duration, Duration) {
        let exp = attempt.saturating_sub(1).min(32);
        let lower = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay);
        let upper = (lower + self.jitter).min(self.max_delay + self.jitter);
        (lower, upper)
    }

    /// Sample the wait after attempt `k` within [`Self::backoff_bounds`].
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let (lower, _) = self.backoff_bounds(attempt);
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        };
        lower + jitter
    }

    /// Run `op` until it succeeds, fails terminally, or the attempt budget
    /// is exhausted. `op` receives the 1-based attempt number.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> RetryReport<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut waits = Vec::new();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => {
                    return RetryReport {
                        outcome: Ok(value),
                        attempts: attempt,
                        waits,
                    };
                }
                Err(err) if !err.is_transient() => {
                    debug!(attempt, %err, "terminal failure, not retrying");
                    return RetryReport {
                        outcome: Err(err),
                        attempts: attempt,
                        waits,
                    };
                }
                Err(err) if attempt >= self.max_attempts => {
                    warn!(attempt, %err, "retry budget exhausted");
                    return RetryReport {
                        outcome: Err(err),
                        attempts: attempt,
                        waits,
                    };
                }
                Err(err) => {
                    let delay = self.backoff_delay(attempt);
                    debug!(attempt, ?delay, %err, "transient failure, backing off");
                    waits.push(delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(200),
            jitter: Duration::from_millis(5),
        }
    }

    #[test]
    fn backoff_bounds_double_per_attempt() {
        let policy = fast_policy();
        assert_eq!(policy.backoff_bounds(1).0, Duration::from_millis(10));
        assert_eq!(policy.backoff_bounds(2).0, Duration::from_millis(20));
        assert_eq!(policy.backoff_bounds(3).0, Duration::from_millis(40));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            jitter: Duration::ZERO,
        };
        assert_eq!(policy.backoff_bounds(9).0, Duration::from_millis(300));
        assert_eq!(policy.backoff_delay(9), Duration::from_millis(300));
    }

    #[test]
    fn sampled_delay_stays_within_bounds() {
        let policy = fast_policy();
        for attempt in 1..=3 {
            let (lower, upper) = policy.backoff_bounds(attempt);
            for _ in 0..50 {
                let delay = policy.backoff_delay(attempt);
                assert!(delay >= lower && delay <= upper, "attempt {attempt}: {delay:?}");
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_failure_stops_after_one_attempt() {
        let calls = AtomicU32::new(0);
        let report = fast_policy()
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(FetchError::terminal("HTTP 404: gone")) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.attempts, 1);
        assert!(report.waits.is_empty());
        assert!(report.outcome.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_exhaust_the_budget() {
        let calls = AtomicU32::new(0);
        let report = fast_policy()
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(FetchError::transient("timeout")) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.attempts, 3);
        assert_eq!(report.waits.len(), 2);
        let err = report.outcome.expect_err("exhausted");
        assert!(err.is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_twice_then_success() {
        let calls = AtomicU32::new(0);
        let report = fast_policy()
            .execute(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(FetchError::from_status(429).expect("429 is an error"))
                    } else {
                        Ok("payload")
                    }
                }
            })
            .await;
        assert_eq!(report.attempts, 3);
        assert_eq!(report.waits.len(), 2, "two backoff delays recorded");
        assert_eq!(report.outcome.expect("succeeds"), "payload");

        let policy = fast_policy();
        for (i, wait) in report.waits.iter().enumerate() {
            let (lower, upper) = policy.backoff_bounds(i as u32 + 1);
            assert!(*wait >= lower && *wait <= upper);
        }
    }
}
