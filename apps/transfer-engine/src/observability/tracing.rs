//! Structured logging setup.
//!
//! # Example
//!
//! ```ignore
//! use transfer_engine::config::LoggingConfig;
//! use transfer_engine::observability::init_tracing;
//!
//! init_tracing(&LoggingConfig::default()).expect("Failed to initialize tracing");
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{LogFormat, LoggingConfig};

/// Error type for tracing operations.
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    /// The configured level is not a valid filter directive.
    #[error("invalid log filter '{filter}': {message}")]
    InvalidFilter {
        /// Filter string that failed to parse.
        filter: String,
        /// Parser message.
        message: String,
    },
    /// Failed to initialize tracing subscriber.
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberError(String),
}

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `config.level` and `config.directives`.
///
/// # Errors
///
/// Returns an error if the level is not a valid filter or a global
/// subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), TracingError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let filter = config.filter();
            EnvFilter::try_new(&filter).map_err(|e| TracingError::InvalidFilter {
                message: e.to_string(),
                filter,
            })?
        }
    };

    let span_events = if config.include_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_span_events(span_events))
            .try_init(),
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact().with_span_events(span_events))
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(config.include_spans)
                    .with_span_events(span_events),
            )
            .try_init(),
    };
    result.map_err(|e| TracingError::SubscriberError(e.to_string()))?;

    tracing::info!(
        level = %config.level,
        format = %config.format,
        "Tracing initialized"
    );

    Ok(())
}

/// Generate an identifier for correlating a logged failure with operator reports.
#[must_use]
pub fn new_error_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
