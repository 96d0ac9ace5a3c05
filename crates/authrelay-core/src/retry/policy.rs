use std::time::Duration;

use crate::classify::ErrorKind;
use crate::config::RetryConfig;

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry; surface the last outcome unchanged.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Bounded exponential backoff for transient failures.
///
/// Delay before retry `n` (1-based) is `base_delay * multiplier^(n-1)`,
/// capped at `max_delay`. The cap keeps the sequence non-decreasing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of re-invocations after the initial call.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Growth factor between successive delays (clamped to >= 1.0).
    pub multiplier: f64,
    /// Upper bound on a single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 1.5,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    /// Out-of-range delays (infinite or beyond `Duration`) fall back to `max_delay`.
    fn from(cfg: &RetryConfig) -> Self {
        let max_delay = Duration::from_secs(cfg.max_delay_secs);
        Self {
            max_attempts: cfg.max_attempts,
            base_delay: Duration::try_from_secs_f64(cfg.base_delay_secs.max(0.0))
                .unwrap_or(max_delay),
            multiplier: cfg.multiplier.max(1.0),
            max_delay,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows `attempt` retries already made.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(64) as i32);
        let secs = self.base_delay.as_secs_f64() * factor;
        let max = self.max_delay.as_secs_f64();
        if !secs.is_finite() || secs >= max {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    /// Decide whether to retry after a failure of `kind`.
    ///
    /// `attempt` is the number of retries already made (0 after the initial call).
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts || !kind.is_transient() {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.delay_for(attempt))
    }
}
