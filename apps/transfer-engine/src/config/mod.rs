//! Configuration for the transfer engine.
//!
//! YAML is read with `serde_yaml_bw`, `${VAR}` / `${VAR:-default}`
//! references are expanded from the environment, and the result is
//! validated before any component is built from it.
//!
//! # Usage
//!
//! ```rust,ignore
//! use transfer_engine::config::load_config;
//!
//! // Load from default path (transfer-engine.yaml)
//! let config = load_config(None)?;
//! let breaker = config.circuit_breaker.ledger_config();
//! ```

mod cache;
mod circuit_breaker;
mod execution;
mod ledger;
mod observability;
mod retry;

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use cache::CacheConfig;
pub use circuit_breaker::{CircuitBreakerConfig, CircuitBreakerSettings};
pub use execution::{BatchConfig, RunnerConfig};
pub use ledger::LedgerConfig;
pub use observability::{LogFormat, LoggingConfig, ObservabilityConfig};
pub use retry::RetryConfig;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "transfer-engine.yaml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),

    /// Regex for environment interpolation could not be built.
    #[error("Environment interpolation unavailable: {0}")]
    Interpolation(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Read-through cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Circuit breaker settings per dependency.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    /// Retry settings.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Concurrency cap for commands.
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Audit batch thresholds.
    #[serde(default)]
    pub batch: BatchConfig,
    /// Ledger business rules.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to `transfer-engine.yaml`.
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<EngineConfig, ConfigError> {
    let path = path.unwrap_or(DEFAULT_CONFIG_PATH);

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string.
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<EngineConfig, ConfigError> {
    let interpolated = interpolate_env_vars(yaml)?;
    let config: EngineConfig = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax. Unset or empty
/// variables without a default expand to the empty string.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    static ENV_VAR_REGEX: OnceLock<Result<regex::Regex, regex::Error>> = OnceLock::new();

    let re = ENV_VAR_REGEX
        .get_or_init(|| regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}"))
        .as_ref()
        .map_err(|e| ConfigError::Interpolation(e.to_string()))?;

    let expanded = re.replace_all(input, |cap: &regex::Captures<'_>| {
        let value = cap.get(1).and_then(|name| std::env::var(name.as_str()).ok());
        match value {
            Some(v) if !v.is_empty() => v,
            _ => cap.get(2).map_or_else(String::new, |m| m.as_str().to_string()),
        }
    });

    Ok(expanded.into_owned())
}

/// Validate configuration values.
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` naming the first offending field.
pub fn validate_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.cache.capacity == 0 {
        return Err(invalid("cache.capacity must be at least 1"));
    }

    for (section, settings) in config.circuit_breaker.sections() {
        if settings.failure_threshold == 0 {
            return Err(ConfigError::ValidationError(format!(
                "circuit_breaker.{section}.failure_threshold must be at least 1"
            )));
        }
        if settings.call_timeout_ms == Some(0) {
            return Err(ConfigError::ValidationError(format!(
                "circuit_breaker.{section}.call_timeout_ms must be positive"
            )));
        }
    }

    let retry = &config.retry;
    if retry.base_delay_ms > retry.max_delay_ms {
        return Err(invalid("retry.base_delay_ms must not exceed retry.max_delay_ms"));
    }
    if !(0.0..=1.0).contains(&retry.jitter_factor) {
        return Err(invalid("retry.jitter_factor must be between 0.0 and 1.0"));
    }

    if config.runner.max_concurrent == 0 {
        return Err(invalid("runner.max_concurrent must be at least 1"));
    }

    if config.batch.batch_size == 0 {
        return Err(invalid("batch.batch_size must be at least 1"));
    }
    if config.batch.flush_interval_ms == 0 {
        return Err(invalid("batch.flush_interval_ms must be positive"));
    }

    if config.ledger.holding_account.trim().is_empty() {
        return Err(invalid("ledger.holding_account must not be empty"));
    }
    if config.ledger.max_transfer_amount <= 0 {
        return Err(invalid("ledger.max_transfer_amount must be positive"));
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::resilience::BackoffStrategy;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();

        assert_eq!(config.cache.capacity, 1000);
        assert_eq!(config.cache.default_ttl(), Duration::from_secs(300));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.batch.batch_size, 100);
        assert_eq!(config.ledger.max_transfer_amount, 1_000_000);
        assert_eq!(config.observability.logging.format, LogFormat::Json);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_load_empty_config_uses_defaults() {
        let config = match load_config_from_string("{}") {
            Ok(c) => c,
            Err(e) => panic!("should load empty config: {e}"),
        };
        assert_eq!(config.runner.max_concurrent, 16);
        assert_eq!(config.circuit_breaker.ledger_config().failure_threshold, 5);
    }

    #[test]
    fn test_per_dependency_breaker_override() {
        let yaml = r"
circuit_breaker:
  default:
    failure_threshold: 4
    cooldown_secs: 10
  record_store:
    failure_threshold: 2
    cooldown_secs: 1
    call_timeout_ms: 250
";
        let config = load_config_from_string(yaml).unwrap();

        let ledger = config.circuit_breaker.ledger_config();
        assert_eq!(ledger.failure_threshold, 4);
        assert_eq!(ledger.cooldown, Duration::from_secs(10));
        assert_eq!(ledger.call_timeout, None);

        let records = config.circuit_breaker.record_store_config();
        assert_eq!(records.failure_threshold, 2);
        assert_eq!(records.call_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_retry_section_converts_to_policy() {
        let yaml = r"
retry:
  max_retries: 5
  base_delay_ms: 50
  max_delay_ms: 400
  strategy: linear
";
        let policy = load_config_from_string(yaml).unwrap().retry.to_policy();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.strategy, BackoffStrategy::Linear);
        assert_eq!(policy.base_delay, Duration::from_millis(50));
        assert_eq!(policy.max_delay, Duration::from_millis(400));
    }

    #[test]
    fn test_env_var_with_default_when_missing() {
        let input = "holding_account: ${TRANSFER_ENGINE_TEST_NONEXISTENT_VAR:-vault}";
        let result = interpolate_env_vars(input).unwrap();
        assert_eq!(result, "holding_account: vault");
    }

    #[test]
    fn test_env_var_without_default_expands_empty() {
        let input = "level: '${TRANSFER_ENGINE_TEST_OTHER_MISSING_VAR}'";
        assert_eq!(interpolate_env_vars(input).unwrap(), "level: ''");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases = [
            ("cache:\n  capacity: 0\n", "cache.capacity"),
            (
                "circuit_breaker:\n  ledger:\n    failure_threshold: 0\n",
                "circuit_breaker.ledger.failure_threshold",
            ),
            (
                "retry:\n  base_delay_ms: 10\n  max_delay_ms: 5\n",
                "retry.base_delay_ms",
            ),
            ("retry:\n  jitter_factor: 1.5\n", "retry.jitter_factor"),
            ("runner:\n  max_concurrent: 0\n", "runner.max_concurrent"),
            ("batch:\n  batch_size: 0\n", "batch.batch_size"),
            ("ledger:\n  holding_account: ' '\n", "ledger.holding_account"),
            ("ledger:\n  max_transfer_amount: -1\n", "ledger.max_transfer_amount"),
        ];

        for (yaml, field) in cases {
            match load_config_from_string(yaml) {
                Err(ConfigError::ValidationError(message)) => {
                    assert!(message.contains(field), "{message} should name {field}");
                }
                other => panic!("expected validation error for {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = load_config(Some("/nonexistent/transfer-engine.yaml"));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }
}
