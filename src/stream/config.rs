//! Configuration for the telemetry stream client.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reconnection policy for the telemetry stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,
    /// Multiplier applied to the delay on each consecutive failure
    pub growth_factor: f64,
    /// Upper bound on the retry delay, in milliseconds
    pub max_delay_ms: u64,
    /// Consecutive failures tolerated before giving up
    pub max_attempts: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            growth_factor: 2.0,
            max_delay_ms: 30_000,
            max_attempts: 10,
        }
    }
}

impl StreamConfig {
    /// Delay before retry attempt `n` (starting at 0):
    /// `min(base_delay * growth_factor^n, max_delay)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let raw = self.base_delay_ms as f64 * self.growth_factor.powi(attempt as i32);
        let capped = raw.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }
}
