//! Backoff Schedule
//!
//! Deterministic exponential delays between retry attempts.

use std::time::Duration;

use crate::config::RetryConfig;

/// Yields the delay before each retry: `initial`, then `min(prev * multiplier, max)`.
///
/// No jitter is applied, so the schedule is fully determined by the policy.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    max: Duration,
    multiplier: f64,
}

impl Backoff {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            current: config.initial_backoff.min(config.max_backoff),
            max: config.max_backoff,
            multiplier: config.backoff_multiplier,
        }
    }

    fn grow(&self) -> Duration {
        // Float-to-int `as` saturates, so huge products clamp before the cap.
        let nanos = (self.current.as_nanos() as f64 * self.multiplier) as u64;
        Duration::from_nanos(nanos).min(self.max)
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self.current;
        self.current = self.grow();
        Some(delay)
    }
}
