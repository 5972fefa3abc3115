//! Retry-around-breaker composition for one dependency.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use super::circuit_breaker::CircuitBreaker;
use super::retry::RetryPolicy;
use crate::error::{CircuitBreakerError, Classify};

/// `RetryPolicy(CircuitBreaker(call))` as one inspectable value.
///
/// Every attempt asks the breaker for admission first. A rejected attempt
/// never invokes the operation and is retried like any other transient
/// failure.
#[derive(Debug, Clone)]
pub struct ResiliencePipeline {
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
}

impl ResiliencePipeline {
    /// Compose a retry policy around a breaker.
    #[must_use]
    pub const fn new(retry: RetryPolicy, breaker: Arc<CircuitBreaker>) -> Self {
        Self { retry, breaker }
    }

    /// The outer retry policy.
    #[must_use]
    pub const fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The inner circuit breaker.
    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Run `operation` through breaker and retry.
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + From<CircuitBreakerError> + Display,
    {
        let breaker = self.breaker.as_ref();
        self.retry
            .execute(move || {
                let admitted = breaker
                    .try_acquire()
                    .map(|permit| (permit, operation()));
                async move {
                    let (permit, call) = admitted.map_err(E::from)?;
                    permit.run(call).await
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::error::ExecutionError;
    use crate::resilience::{CircuitBreakerConfig, CircuitBreakerState};

    fn pipeline(max_retries: u32, threshold: u32) -> ResiliencePipeline {
        ResiliencePipeline::new(
            RetryPolicy::new(max_retries, Duration::from_millis(10), Duration::from_millis(100)),
            Arc::new(CircuitBreaker::new(
                "ledger",
                CircuitBreakerConfig {
                    failure_threshold: threshold,
                    cooldown: Duration::from_secs(30),
                    call_timeout: None,
                },
            )),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_through_breaker_until_success() {
        let pipeline = pipeline(3, 10);
        let calls = AtomicU32::new(0);

        let result: Result<u32, ExecutionError> = pipeline
            .execute(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(ExecutionError::unavailable("ledger", "down"))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(pipeline.breaker().state(), CircuitBreakerState::Closed);
        assert_eq!(pipeline.breaker().failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_stops_invocations() {
        let pipeline = pipeline(5, 2);
        let calls = AtomicU32::new(0);

        let result: Result<(), ExecutionError> = pipeline
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ExecutionError::unavailable("ledger", "down"))
            })
            .await;

        // Two real failures open the circuit; the remaining attempts are rejected.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            result,
            Err(ExecutionError::CircuitOpen {
                dependency: "ledger".to_string()
            })
        );
        assert_eq!(pipeline.breaker().state(), CircuitBreakerState::Open);
    }

    #[tokio::test]
    async fn test_fatal_error_passes_through_once() {
        let pipeline = pipeline(5, 1);
        let calls = AtomicU32::new(0);

        let result: Result<(), ExecutionError> = pipeline
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ExecutionError::not_found("TransferRecord", "r-1"))
            })
            .await;

        assert_eq!(result.unwrap_err().code(), "RESOURCE_NOT_FOUND");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.breaker().state(), CircuitBreakerState::Closed);
    }
}
