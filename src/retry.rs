//! Retry with exponential backoff and jitter.
//!
//! One policy object and one generic wrapper instead of ad hoc retry loops
//! at each call site. Callers decide which errors are retryable.

use std::fmt::Display;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

/// Backoff policy for retryable operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each retry
    pub base_delay: Duration,
    /// Cap on the computed delay, before jitter
    pub max_delay: Duration,
    /// Jitter fraction in `[0, 1]`: each delay is scaled by a random
    /// factor in `[1 - jitter, 1 + jitter]`
    pub jitter: f64,
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry (1-based: first retry is 1).
    #[inline]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let backoff = self.base_delay.saturating_mul(1 << exponent);
        let capped = backoff.min(self.max_delay);

        if self.jitter <= 0.0 {
            return capped;
        }
        let factor = 1.0 - self.jitter + rand::rng().random::<f64>() * self.jitter * 2.0;
        capped.mul_f64(factor)
    }
}

/// Run `operation` up to `policy.max_attempts` times, sleeping between
/// attempts, as long as `is_retryable` approves the error. Non-retryable
/// errors propagate immediately.
#[inline]
pub async fn with_retry<T, E, F, Fut, R>(
    mut operation: F,
    policy: &RetryPolicy,
    is_retryable: R,
    label: &str,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    R: Fn(&E) -> bool,
{
    let attempts = policy.max_attempts.max(1);

    for attempt in 1..=attempts {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}/{}", label, attempt, attempts);
                }
                return Ok(value);
            }
            Err(error) if attempt < attempts && is_retryable(&error) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "{} failed on attempt {}/{} ({}), retrying in {:?}",
                    label, attempt, attempts, error, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => return Err(error),
        }
    }

    unreachable!("retry loop always returns")
}
