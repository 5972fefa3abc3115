//! Resilience patterns for dependency calls.
//!
//! Circuit breaking, bounded retry, their composition, and a bounded
//! task runner for admitting work.

mod circuit_breaker;
mod pipeline;
mod retry;
mod task_runner;

pub use circuit_breaker::{
    CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitBreakerState,
};
pub use pipeline::ResiliencePipeline;
pub use retry::{BackoffStrategy, RetryPolicy};
pub use task_runner::{BoundedTaskRunner, RunError, ShutdownReport, TaskFailure};
