//! Backoff strategies between acquisition attempts
//!
//! Jitter spreads competing callers apart so they do not re-contend for the
//! same stores in lockstep.

use std::fmt::Debug;
use std::time::Duration;

use rand::Rng;

/// Pluggable delay strategy consulted by `LockManager` between attempts.
pub trait RetryPolicy: Send + Sync + Debug {
    /// Delay before retry number `retry` (1-based).
    fn delay(&self, retry: u32) -> Duration;

    /// Delay before the next attempt, or `None` once `max_retries` retries
    /// have already been made.
    fn next_delay(&self, retries_done: u32, max_retries: u32) -> Option<Duration> {
        (retries_done < max_retries).then(|| self.delay(retries_done + 1))
    }
}

/// Uniformly random delay in `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomDelay {
    pub min: Duration,
    pub max: Duration,
}

impl RandomDelay {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }
}

impl Default for RandomDelay {
    fn default() -> Self {
        Self::new(Duration::from_millis(50), Duration::from_millis(250))
    }
}

impl RetryPolicy for RandomDelay {
    fn delay(&self, _retry: u32) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

/// Exponential backoff capped at `max`, with symmetric jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(50),
            max: Duration::from_secs(2),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_delay = self.initial.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped_delay = base_delay.min(self.max.as_millis() as f64);

        let jitter_range = capped_delay * self.jitter.clamp(0.0, 1.0);
        let jitter = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range;
        let final_delay = (capped_delay + jitter).max(0.0) as u64;

        Duration::from_millis(final_delay)
    }
}

/// Same delay before every retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay(pub Duration);

impl RetryPolicy for FixedDelay {
    fn delay(&self, _retry: u32) -> Duration {
        self.0
    }
}
