//! Runner and batch configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::BatchConfig as BatchThresholds;

/// Bounded task runner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Commands allowed in flight at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

/// Audit batch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Pending items that trigger a flush.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum time between flushes (milliseconds).
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl BatchConfig {
    /// Convert to the accumulator's thresholds.
    #[must_use]
    pub const fn to_thresholds(&self) -> BatchThresholds {
        BatchThresholds {
            batch_size: self.batch_size,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
        }
    }
}

const fn default_max_concurrent() -> usize {
    16
}

const fn default_batch_size() -> usize {
    100
}

const fn default_flush_interval_ms() -> u64 {
    5_000
}
