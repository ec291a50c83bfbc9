//! Retry policy: decides backoff delays.

use std::time::Duration;

/// Retry policy for failed action entries.
///
/// delay(n) = min(base_delay * multiplier^(n - 1), max_delay)
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first failure.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for any single delay.
    pub max_delay: Duration,

    /// Attempts allowed before an entry is dropped and reverted.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    /// 1s, 2s, 4s, 8s, 10s; five attempts.
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            max_retries: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt.
    ///
    /// # Arguments
    /// * `retry_count` - Failures so far (1-indexed). 0 is treated as 1.
    pub fn next_delay(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        // powi overflows to inf for large exponents; clamp before converting.
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}
