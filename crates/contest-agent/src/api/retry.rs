//! Automatic retry with exponential backoff.
//!
//! Retries transient provider failures (rate limits, timeouts) with
//! exponential backoff capped at a maximum delay. Every other error is
//! propagated on the first failure. See [`ProviderError::is_retryable`].

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::ProviderError;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, counting the first call. `0` behaves like `1`.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier (typically 2.0 for exponential backoff).
    pub multiplier: f64,
    /// Whether to shorten delays by a deterministic jitter factor.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Default backoff with the given attempt budget.
    pub fn with_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Default attempt budget with no waiting between attempts.
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    /// Calculate the delay before retry number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.jitter {
            // Deterministic jitter keyed on the attempt number so agents that
            // hit the same rate limit together spread out a little.
            let jitter_factor = match attempt % 4 {
                0 => 0.75,
                1 => 0.90,
                2 => 0.60,
                _ => 0.85,
            };
            Duration::from_secs_f64(capped * jitter_factor)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

/// Per-call retry bookkeeping. Built for each retry, logged, then dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryContext {
    /// The attempt that just failed (1-indexed).
    pub attempt: u32,
    pub max_attempts: u32,
    /// Delay before the next attempt.
    pub delay: Duration,
}

impl fmt::Display for RetryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempt {}/{}, retrying in {:?}",
            self.attempt, self.max_attempts, self.delay
        )
    }
}

/// Run `call` until it succeeds, fails permanently, or the attempt budget is
/// spent.
///
/// Exhausting the budget returns [`ProviderError::RetriesExhausted`] wrapping
/// the last error, which is itself not retryable. The backoff sleep is a
/// suspension point: dropping the returned future (e.g. on cancellation)
/// abandons the retry immediately.
pub async fn invoke_with_retry<T, F, Fut>(
    config: &RetryConfig,
    label: &str,
    mut call: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match call().await {
            Ok(v) => return Ok(v),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if attempt >= max_attempts => {
                warn!("[{label}] Giving up after {attempt} attempt(s): {e}");
                return Err(ProviderError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(e),
                });
            }
            Err(e) => {
                let ctx = RetryContext {
                    attempt,
                    max_attempts,
                    delay: config.delay_for_attempt(attempt - 1),
                };
                warn!("[{label}] Transient provider error ({ctx}): {e}");
                tokio::time::sleep(ctx.delay).await;
            }
        }
    }
}
