//! Circuit breaker configuration for dependency calls.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CircuitBreakerConfig {
    /// Default circuit breaker settings.
    #[serde(default)]
    pub default: CircuitBreakerSettings,
    /// Ledger-specific settings.
    #[serde(default)]
    pub ledger: Option<CircuitBreakerSettings>,
    /// Record-store-specific settings.
    #[serde(default)]
    pub record_store: Option<CircuitBreakerSettings>,
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Duration in open state (seconds).
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    /// Per-call timeout (milliseconds). Absent means no timeout.
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown(),
            call_timeout_ms: None,
        }
    }
}

impl CircuitBreakerSettings {
    /// Convert config settings to the resilience module's `CircuitBreakerConfig`.
    #[must_use]
    pub const fn to_resilience_config(&self) -> crate::resilience::CircuitBreakerConfig {
        crate::resilience::CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            cooldown: Duration::from_secs(self.cooldown_secs),
            call_timeout: match self.call_timeout_ms {
                Some(ms) => Some(Duration::from_millis(ms)),
                None => None,
            },
        }
    }
}

impl CircuitBreakerConfig {
    /// Breaker config for the ledger, falling back to defaults.
    #[must_use]
    pub fn ledger_config(&self) -> crate::resilience::CircuitBreakerConfig {
        self.ledger.as_ref().map_or_else(
            || self.default.to_resilience_config(),
            CircuitBreakerSettings::to_resilience_config,
        )
    }

    /// Breaker config for the record store, falling back to defaults.
    #[must_use]
    pub fn record_store_config(&self) -> crate::resilience::CircuitBreakerConfig {
        self.record_store.as_ref().map_or_else(
            || self.default.to_resilience_config(),
            CircuitBreakerSettings::to_resilience_config,
        )
    }

    /// All configured settings with their section names.
    pub(crate) fn sections(&self) -> impl Iterator<Item = (&'static str, &CircuitBreakerSettings)> {
        std::iter::once(("default", &self.default))
            .chain(self.ledger.iter().map(|s| ("ledger", s)))
            .chain(self.record_store.iter().map(|s| ("record_store", s)))
    }
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_cooldown() -> u64 {
    60
}
