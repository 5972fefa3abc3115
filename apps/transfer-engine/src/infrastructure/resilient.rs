//! Port adapters that route every call through a resilience pipeline.
//!
//! `ResilientLedger` and `ResilientRecordStore` implement the same ports as
//! the dependency they wrap, so a `CompensatingCommand` runs over them
//! unchanged. Each wrapper owns the pipeline (retry around the dependency's
//! breaker) for its dependency.

use std::sync::Arc;

use async_trait::async_trait;

use crate::command::{AccountId, RecordId, TransferRecord};
use crate::error::ExecutionError;
use crate::ports::{LedgerPort, RecordStorePort};
use crate::resilience::ResiliencePipeline;

/// Ledger calls through retry and circuit breaker.
#[derive(Debug)]
pub struct ResilientLedger<L> {
    inner: Arc<L>,
    pipeline: ResiliencePipeline,
}

impl<L: LedgerPort> ResilientLedger<L> {
    /// Wrap `inner` with `pipeline`.
    #[must_use]
    pub const fn new(inner: Arc<L>, pipeline: ResiliencePipeline) -> Self {
        Self { inner, pipeline }
    }

    /// The pipeline guarding the ledger.
    #[must_use]
    pub const fn pipeline(&self) -> &ResiliencePipeline {
        &self.pipeline
    }

    /// The wrapped ledger.
    #[must_use]
    pub const fn inner(&self) -> &Arc<L> {
        &self.inner
    }
}

#[async_trait]
impl<L: LedgerPort> LedgerPort for ResilientLedger<L> {
    async fn get_balance(&self, account: &AccountId) -> Result<i64, ExecutionError> {
        let inner = self.inner.as_ref();
        self.pipeline.execute(|| inner.get_balance(account)).await
    }

    async fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: i64,
    ) -> Result<bool, ExecutionError> {
        let inner = self.inner.as_ref();
        self.pipeline
            .execute(|| inner.transfer(from, to, amount))
            .await
    }
}

/// Record store calls through retry and circuit breaker.
#[derive(Debug)]
pub struct ResilientRecordStore<R> {
    inner: Arc<R>,
    pipeline: ResiliencePipeline,
}

impl<R: RecordStorePort> ResilientRecordStore<R> {
    /// Wrap `inner` with `pipeline`.
    #[must_use]
    pub const fn new(inner: Arc<R>, pipeline: ResiliencePipeline) -> Self {
        Self { inner, pipeline }
    }

    /// The pipeline guarding the record store.
    #[must_use]
    pub const fn pipeline(&self) -> &ResiliencePipeline {
        &self.pipeline
    }

    /// The wrapped record store.
    #[must_use]
    pub const fn inner(&self) -> &Arc<R> {
        &self.inner
    }
}

#[async_trait]
impl<R: RecordStorePort> RecordStorePort for ResilientRecordStore<R> {
    async fn read(&self, id: &RecordId) -> Result<Option<TransferRecord>, ExecutionError> {
        let inner = self.inner.as_ref();
        self.pipeline.execute(|| inner.read(id)).await
    }

    async fn write(&self, record: &TransferRecord) -> Result<bool, ExecutionError> {
        let inner = self.inner.as_ref();
        self.pipeline.execute(|| inner.write(record)).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::ports::{MockLedgerPort, MockRecordStorePort};
    use crate::resilience::{
        CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState, RetryPolicy,
    };

    fn pipeline(name: &str, max_retries: u32, threshold: u32) -> ResiliencePipeline {
        ResiliencePipeline::new(
            RetryPolicy::new(max_retries, Duration::from_millis(10), Duration::from_millis(50)),
            Arc::new(CircuitBreaker::new(
                name,
                CircuitBreakerConfig {
                    failure_threshold: threshold,
                    cooldown: Duration::from_secs(30),
                    call_timeout: None,
                },
            )),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_ledger_failure_is_retried() {
        let mut ledger = MockLedgerPort::new();
        let mut calls = 0;
        ledger.expect_get_balance().times(3).returning(move |_| {
            calls += 1;
            if calls < 3 {
                Err(ExecutionError::unavailable("ledger", "connection reset"))
            } else {
                Ok(1000)
            }
        });

        let resilient = ResilientLedger::new(Arc::new(ledger), pipeline("ledger", 3, 10));
        let balance = resilient.get_balance(&AccountId::new("alice")).await;

        assert_eq!(balance, Ok(1000));
        assert_eq!(resilient.pipeline().breaker().failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_record_failure_is_not_retried() {
        let mut records = MockRecordStorePort::new();
        records
            .expect_read()
            .times(1)
            .returning(|_| Err(ExecutionError::validation("id", "malformed")));

        let resilient = ResilientRecordStore::new(Arc::new(records), pipeline("record_store", 3, 10));
        let result = resilient.read(&RecordId::new("r-1")).await;

        assert_eq!(result.unwrap_err().code(), "VALIDATION_FAILURE");
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_stops_invoking_the_dependency() {
        let mut records = MockRecordStorePort::new();
        records
            .expect_write()
            .times(2)
            .returning(|_| Err(ExecutionError::unavailable("record_store", "down")));

        let resilient = ResilientRecordStore::new(Arc::new(records), pipeline("record_store", 4, 2));
        let record = TransferRecord::for_request(
            &crate::command::CommandId::new("cmd-1"),
            &crate::command::LedgerTransferRequest::new("alice", "holding", 10).unwrap(),
        );
        let result = resilient.write(&record).await;

        assert_eq!(
            result,
            Err(ExecutionError::CircuitOpen {
                dependency: "record_store".to_string()
            })
        );
        assert_eq!(
            resilient.pipeline().breaker().state(),
            CircuitBreakerState::Open
        );
    }
}
