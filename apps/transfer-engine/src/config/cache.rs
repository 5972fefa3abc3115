//! Cache configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Read-through cache settings, shared by the balance and record caches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum entries per cache.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Default time-to-live (seconds).
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            default_ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheConfig {
    /// Default time-to-live as a `Duration`.
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

const fn default_capacity() -> usize {
    1000
}

const fn default_ttl_secs() -> u64 {
    300
}
