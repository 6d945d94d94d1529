// Retry policy for outbound webhook deliveries
//
// Attempts are counted from 1. A policy with `max_attempts == 1` never retries.

use rand::Rng;
use std::time::Duration;

/// Decides whether and how long to wait before another attempt
pub trait RetryStrategy: Send + Sync {
    /// Delay before attempt `attempt + 1`, or None once attempts are exhausted
    fn next_delay(&self, attempt: u32) -> Option<Duration>;

    /// Total attempts allowed, including the first
    fn max_attempts(&self) -> u32;

    fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts()
    }
}

/// Doubling backoff with additive jitter
///
/// Sequence for the defaults: 500ms, 1s, 2s, 4s, 8s (capped).
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay_ms: u64,
    max_delay_ms: u64,
    /// 0.0 to 1.0
    jitter_factor: f64,
    max_attempts: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            jitter_factor: 0.1,
            max_attempts: 1,
        }
    }
}

impl ExponentialBackoff {
    /// Default delays with the given attempt budget (at least one attempt)
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    pub fn with_config(
        base_delay_ms: u64,
        max_delay_ms: u64,
        jitter_factor: f64,
        max_attempts: u32,
    ) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Delay without jitter after the given (1-based) attempt
    fn base_delay_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(32);
        self.base_delay_ms
            .saturating_mul(2_u64.saturating_pow(exponent))
            .min(self.max_delay_ms)
    }

    fn with_jitter(&self, delay_ms: u64) -> u64 {
        let range = (delay_ms as f64 * self.jitter_factor) as u64;
        if range == 0 {
            return delay_ms;
        }
        delay_ms + rand::thread_rng().gen_range(0..=range)
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if !self.should_retry(attempt) {
            return None;
        }
        Some(Duration::from_millis(
            self.with_jitter(self.base_delay_ms(attempt)),
        ))
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
