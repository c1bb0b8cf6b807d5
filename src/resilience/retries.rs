//! Retry budget for operation dispatch.
//!
//! # Responsibilities
//! - Decide whether a failed operation gets another attempt
//! - Compute when that attempt may happen
//!
//! # Design Decisions
//! - The budget counts attempts, not wall-clock time
//! - Delays use "equal jitter": half of the exponential step is fixed,
//!   the other half random, so operations that failed together spread out
//!   without ever retrying sooner than half the step

use chrono::Duration;
use rand::Rng;

use crate::config::RetryConfig;

/// Attempt budget and backoff applied to every queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay_ms, config.max_delay_ms)
    }

    /// True once `attempts` dispatches have used up the budget.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    /// Upper bound of the delay after `attempts` failures:
    /// `base * 2^(attempts - 1)`, capped at `max_delay_ms`.
    pub fn step_ms(&self, attempts: u32) -> u64 {
        if attempts == 0 {
            return 0;
        }
        let factor = 1u64.checked_shl(attempts - 1).unwrap_or(u64::MAX);
        self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms)
    }

    /// Delay before the next attempt, after `attempts` failures.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        self.delay_with(attempts, &mut rand::thread_rng())
    }

    /// [`delay_for`](Self::delay_for) with a caller-supplied random source.
    pub fn delay_with<R: Rng>(&self, attempts: u32, rng: &mut R) -> Duration {
        let step = self.step_ms(attempts);
        let fixed = step - step / 2;
        let jitter = if step / 2 > 0 { rng.gen_range(0..=step / 2) } else { 0 };
        Duration::milliseconds(i64::try_from(fixed + jitter).unwrap_or(i64::MAX))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
