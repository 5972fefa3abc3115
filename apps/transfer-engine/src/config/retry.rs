//! Retry configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::{BackoffStrategy, RetryPolicy};

/// Retry settings applied to every dependency call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry (milliseconds).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Cap on any single delay (milliseconds).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Delay growth.
    #[serde(default)]
    pub strategy: BackoffStrategy,
    /// Random spread applied to each delay, `0.0..=1.0`.
    #[serde(default)]
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            strategy: BackoffStrategy::default(),
            jitter_factor: 0.0,
        }
    }
}

impl RetryConfig {
    /// Convert to a `RetryPolicy`.
    #[must_use]
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
        .with_strategy(self.strategy)
        .with_jitter(self.jitter_factor)
    }
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_base_delay_ms() -> u64 {
    1_000
}

const fn default_max_delay_ms() -> u64 {
    60_000
}
