//! Logging configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ObservabilityConfig {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Single-line human readable output.
    Compact,
    /// Multi-line human readable output.
    Pretty,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Compact => "compact",
            Self::Pretty => "pretty",
        })
    }
}

/// Logging configuration.
///
/// ```yaml
/// observability:
///   logging:
///     level: info
///     format: compact
///     directives:
///       - transfer_engine::resilience=debug
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level for every target.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
    /// Emit span open/close events and the current span.
    #[serde(default = "default_include_spans")]
    pub include_spans: bool,
    /// Per-target overrides such as `transfer_engine::batch=debug`.
    #[serde(default)]
    pub directives: Vec<String>,
}

impl LoggingConfig {
    /// Filter string combining `level` and `directives`.
    #[must_use]
    pub fn filter(&self) -> String {
        std::iter::once(self.level.trim())
            .chain(self.directives.iter().map(|d| d.trim()))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            include_spans: default_include_spans(),
            directives: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_include_spans() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_joins_level_and_directives() {
        let config = LoggingConfig {
            directives: vec![
                "transfer_engine::resilience=debug".to_string(),
                " ".to_string(),
                "transfer_engine::batch=trace".to_string(),
            ],
            ..LoggingConfig::default()
        };
        assert_eq!(
            config.filter(),
            "info,transfer_engine::resilience=debug,transfer_engine::batch=trace"
        );
        assert_eq!(LoggingConfig::default().filter(), "info");
    }

    #[test]
    fn format_parses_lowercase_names() {
        let config: LoggingConfig = serde_yaml_bw::from_str("format: pretty").unwrap();
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.format.to_string(), "pretty");
        assert!(serde_yaml_bw::from_str::<LoggingConfig>("format: xml").is_err());
    }
}
