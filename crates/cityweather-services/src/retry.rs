//! Retry policy for upstream round-trips with exponential backoff.
//!
//! Retries transient failures:
//! - Timeouts
//! - 5xx server errors and 408
//! - Connection failures
//!
//! It does NOT retry:
//! - Invalid input
//! - Rejections (4xx including 401, 403, 429)
//! - Unusable response bodies

use std::future::Future;
use std::time::Duration;

use cityweather_core::{RetrySettings, UpstreamError};

/// Default retry configuration
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 100;
pub const DEFAULT_MAX_DELAY_MS: u64 = 5000;

/// Retry configuration.
///
/// Plain data: one policy can be shared by any number of concurrent callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    /// Delay before the second attempt (doubles each attempt)
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_attempts,
            settings.initial_delay_ms,
            settings.max_delay_ms,
        )
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        }
    }

    /// Calculate the delay after the given (zero-based) failed attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let delay_ms = (self.initial_delay.as_millis() as u64).saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis() as u64);
        Duration::from_millis(capped)
    }

    /// Run `operation` until it succeeds, fails with a non-transient error,
    /// or the attempt budget is spent.
    ///
    /// Backoff sleeps happen inside the caller's task, so a retried request
    /// keeps whatever worker slot it was started in.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if attempt > 0 {
                let delay = self.delay_for_attempt(attempt - 1);
                tracing::info!(
                    "Retry attempt {} of {} for {}, waiting {:?}",
                    attempt + 1,
                    max_attempts,
                    label,
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!("{} succeeded after {} retries", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_transient() => {
                    tracing::debug!("Non-retryable error for {}: {}", label, e);
                    return Err(e);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        tracing::error!(
                            "All {} attempts exhausted for {}: {}",
                            max_attempts,
                            label,
                            e
                        );
                        return Err(e);
                    }
                    tracing::warn!(
                        "Retryable error on attempt {} of {} for {}: {}",
                        attempt,
                        max_attempts,
                        label,
                        e
                    );
                }
            }
        }
    }
}
