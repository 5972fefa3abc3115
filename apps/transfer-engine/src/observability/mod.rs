//! Observability module for logging and metrics.
//!
//! The engine records through the `tracing` and `metrics` facades only. The
//! host process decides where logs go and which metrics exporter to install.

pub mod metrics;
mod tracing;

pub use self::tracing::{TracingError, init_tracing, new_error_id};
