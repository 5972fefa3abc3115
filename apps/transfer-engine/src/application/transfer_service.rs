//! Transfer Service
//!
//! Orchestrates compensated transfers. Every dependency call goes through
//! `RetryPolicy(CircuitBreaker(call))`, every command runs under the bounded
//! runner, balance and record reads are cached, and each command's terminal
//! state is written to the audit batch.

use std::sync::Arc;

use serde_json::json;

use crate::batch::{BatchAccumulator, BatchItem, FlushReport};
use crate::cache::{CacheKey, TtlCache};
use crate::command::{
    AccountId, CommandState, CompensatingCommand, LedgerTransferRequest, RecordId,
    TransferReceipt, TransferRecord,
};
use crate::config::EngineConfig;
use crate::error::ExecutionError;
use crate::infrastructure::{ResilientLedger, ResilientRecordStore};
use crate::outcome::Outcome;
use crate::ports::{BatchHandler, LedgerPort, RecordStorePort};
use crate::resilience::{BoundedTaskRunner, CircuitBreaker, ResiliencePipeline, ShutdownReport};

/// Audit kind for a committed transfer.
pub const AUDIT_TRANSFER_COMMITTED: &str = "transfer_committed";
/// Audit kind for a transfer the ledger never applied.
pub const AUDIT_TRANSFER_FAILED: &str = "transfer_failed";
/// Audit kind for a transfer reversed after the record write failed.
pub const AUDIT_TRANSFER_ROLLED_BACK: &str = "transfer_rolled_back";
/// Audit kind for a failed reversal.
pub const AUDIT_COMPENSATION_FAILED: &str = "compensation_failed";

/// Every kind the service writes to the audit batch.
pub const AUDIT_KINDS: [&str; 4] = [
    AUDIT_TRANSFER_COMMITTED,
    AUDIT_TRANSFER_FAILED,
    AUDIT_TRANSFER_ROLLED_BACK,
    AUDIT_COMPENSATION_FAILED,
];

/// Build an audit accumulator that sends every audit kind to `handler`.
#[must_use]
pub fn audit_accumulator(config: &EngineConfig, handler: Arc<dyn BatchHandler>) -> BatchAccumulator {
    AUDIT_KINDS.iter().fold(
        BatchAccumulator::new(config.batch.to_thresholds()),
        |accumulator, kind| accumulator.with_handler(*kind, Arc::clone(&handler)),
    )
}

/// Resilient transfer orchestration over a ledger and a record store.
pub struct TransferService<L, R> {
    ledger: Arc<ResilientLedger<L>>,
    records: Arc<ResilientRecordStore<R>>,
    runner: BoundedTaskRunner,
    balances: Arc<TtlCache<i64>>,
    record_cache: TtlCache<TransferRecord>,
    audit: Arc<BatchAccumulator>,
    holding_account: AccountId,
    max_transfer_amount: i64,
}

impl<L, R> std::fmt::Debug for TransferService<L, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferService")
            .field("runner", &self.runner)
            .field("holding_account", &self.holding_account)
            .field("max_transfer_amount", &self.max_transfer_amount)
            .finish_non_exhaustive()
    }
}

impl<L, R> TransferService<L, R>
where
    L: LedgerPort + 'static,
    R: RecordStorePort + 'static,
{
    /// Build the service from configuration.
    ///
    /// `audit` receives one item per finished command; see [`audit_accumulator`].
    #[must_use]
    pub fn new(config: &EngineConfig, ledger: Arc<L>, records: Arc<R>, audit: BatchAccumulator) -> Self {
        let retry = config.retry.to_policy();
        let ledger_breaker = Arc::new(CircuitBreaker::new(
            "ledger",
            config.circuit_breaker.ledger_config(),
        ));
        let record_breaker = Arc::new(CircuitBreaker::new(
            "record_store",
            config.circuit_breaker.record_store_config(),
        ));
        let ttl = config.cache.default_ttl();

        Self {
            ledger: Arc::new(ResilientLedger::new(
                ledger,
                ResiliencePipeline::new(retry.clone(), ledger_breaker),
            )),
            records: Arc::new(ResilientRecordStore::new(
                records,
                ResiliencePipeline::new(retry, record_breaker),
            )),
            runner: BoundedTaskRunner::new("transfers", config.runner.max_concurrent),
            balances: Arc::new(TtlCache::new("balances", config.cache.capacity, ttl)),
            record_cache: TtlCache::new("records", config.cache.capacity, ttl),
            audit: Arc::new(audit),
            holding_account: AccountId::new(config.ledger.holding_account.clone()),
            max_transfer_amount: config.ledger.max_transfer_amount,
        }
    }

    /// Validate a transfer of `amount` from `subject` into the holding account.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::Validation` for an invalid account or amount.
    pub fn holding_transfer(
        &self,
        subject: impl Into<AccountId>,
        amount: i64,
    ) -> Result<LedgerTransferRequest, ExecutionError> {
        LedgerTransferRequest::with_limit(
            subject,
            self.holding_account.clone(),
            amount,
            self.max_transfer_amount,
        )
    }

    /// Execute one compensated transfer.
    ///
    /// Waits for a runner slot, checks the subject's live balance, then runs
    /// the command. Cached balances of both accounts are invalidated
    /// afterwards whatever the result.
    pub async fn execute_transfer(
        &self,
        request: LedgerTransferRequest,
    ) -> Outcome<TransferReceipt, ExecutionError> {
        let ledger = Arc::clone(&self.ledger);
        let records = Arc::clone(&self.records);
        let balances = Arc::clone(&self.balances);
        let audit = Arc::clone(&self.audit);

        self.runner
            .run(move || run_transfer(request, ledger, records, balances, audit))
            .await
            .map_err(ExecutionError::from)
            .into()
    }

    /// Balance of `account`, served from cache while fresh.
    pub async fn read_balance(&self, account: &AccountId) -> Outcome<i64, ExecutionError> {
        let key = match balance_key(account) {
            Ok(key) => key,
            Err(error) => return Outcome::failure(error),
        };
        let ledger = self.ledger.as_ref();
        self.balances
            .get_or_fetch(key, self.balances.default_ttl(), || {
                ledger.get_balance(account)
            })
            .await
            .into()
    }

    /// A transfer record, served from cache while fresh.
    ///
    /// Absent records are reported as `NotFound` and never cached.
    pub async fn read_record(&self, id: &RecordId) -> Outcome<TransferRecord, ExecutionError> {
        let key = match CacheKey::for_call("read_record", id) {
            Ok(key) => key,
            Err(error) => return Outcome::failure(ExecutionError::validation("id", error.to_string())),
        };
        let records = self.records.as_ref();
        self.record_cache
            .get_or_fetch(key, self.record_cache.default_ttl(), || async move {
                records
                    .read(id)
                    .await?
                    .ok_or_else(|| ExecutionError::not_found("TransferRecord", id.as_str()))
            })
            .await
            .into()
    }

    /// Queue an item on the batch path.
    ///
    /// Succeeds with the flush report when this item triggered a flush.
    pub async fn enqueue_event(&self, item: BatchItem) -> Outcome<Option<FlushReport>, ExecutionError> {
        self.audit.add(item).await.map_err(ExecutionError::from).into()
    }

    /// Stop admitting transfers, drain the running ones, then flush the batch.
    pub async fn shutdown(&self) -> ShutdownReport {
        let report = self.runner.shutdown().await;
        if let Err(error) = self.audit.flush().await {
            tracing::error!(error = %error, "Final audit flush failed");
        }
        report
    }

    /// Command runner.
    #[must_use]
    pub const fn runner(&self) -> &BoundedTaskRunner {
        &self.runner
    }

    /// Breaker guarding the ledger.
    #[must_use]
    pub fn ledger_breaker(&self) -> &CircuitBreaker {
        self.ledger.pipeline().breaker()
    }

    /// Breaker guarding the record store.
    #[must_use]
    pub fn record_store_breaker(&self) -> &CircuitBreaker {
        self.records.pipeline().breaker()
    }

    /// Balance cache.
    #[must_use]
    pub fn balance_cache(&self) -> &TtlCache<i64> {
        &self.balances
    }

    /// Record cache.
    #[must_use]
    pub const fn record_cache(&self) -> &TtlCache<TransferRecord> {
        &self.record_cache
    }

    /// Audit accumulator, for starting its periodic flusher.
    #[must_use]
    pub const fn audit(&self) -> &Arc<BatchAccumulator> {
        &self.audit
    }
}

fn balance_key(account: &AccountId) -> Result<CacheKey, ExecutionError> {
    CacheKey::for_call("get_balance", account)
        .map_err(|e| ExecutionError::validation("account", e.to_string()))
}

async fn run_transfer<L, R>(
    request: LedgerTransferRequest,
    ledger: Arc<ResilientLedger<L>>,
    records: Arc<ResilientRecordStore<R>>,
    balances: Arc<TtlCache<i64>>,
    audit: Arc<BatchAccumulator>,
) -> Result<TransferReceipt, ExecutionError>
where
    L: LedgerPort + 'static,
    R: RecordStorePort + 'static,
{
    let available = ledger.get_balance(request.subject()).await?;
    if available < request.amount() {
        return Err(ExecutionError::InsufficientResource {
            account: request.subject().to_string(),
            required: request.amount(),
            available,
        });
    }

    let mut command = CompensatingCommand::new(request, ledger, records);
    let outcome = command.execute().await;

    for account in [command.request().subject(), command.request().counterparty()] {
        if let Ok(key) = balance_key(account) {
            balances.invalidate(&key).await;
        }
    }

    let item = audit_item(&command, &outcome);
    if let Err(error) = audit.add(item).await {
        tracing::error!(command_id = %command.id(), error = %error, "Audit batch flush failed");
    }

    outcome.into_result()
}

fn audit_item<L, R>(
    command: &CompensatingCommand<L, R>,
    outcome: &Outcome<TransferReceipt, ExecutionError>,
) -> BatchItem
where
    L: LedgerPort,
    R: RecordStorePort,
{
    let kind = match command.state() {
        CommandState::RolledBack => AUDIT_TRANSFER_ROLLED_BACK,
        CommandState::CompensationFailed => AUDIT_COMPENSATION_FAILED,
        CommandState::Executed => AUDIT_TRANSFER_COMMITTED,
        CommandState::Pending | CommandState::Failed => AUDIT_TRANSFER_FAILED,
    };
    let request = command.request();
    let mut payload = json!({
        "command_id": command.id(),
        "subject": request.subject(),
        "counterparty": request.counterparty(),
        "amount": request.amount(),
        "state": command.state(),
    });
    match outcome {
        Outcome::Success(receipt) => {
            payload["record_id"] = json!(receipt.record_id);
        }
        Outcome::Failure(error) => {
            payload["error_code"] = json!(error.code());
            payload["error"] = json!(error.to_string());
        }
    }
    BatchItem::new(kind, payload)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::infrastructure::{InMemoryBatchSink, InMemoryLedger, InMemoryRecordStore};
    use crate::resilience::CircuitBreakerState;

    struct Harness {
        service: TransferService<InMemoryLedger, InMemoryRecordStore>,
        ledger: Arc<InMemoryLedger>,
        records: Arc<InMemoryRecordStore>,
        sink: Arc<InMemoryBatchSink>,
    }

    fn harness(alice: i64) -> Harness {
        let mut config = EngineConfig::default();
        config.retry.base_delay_ms = 10;
        config.retry.max_delay_ms = 100;
        config.batch.batch_size = 1;

        let ledger = Arc::new(InMemoryLedger::with_balances([("alice", alice)]));
        let records = Arc::new(InMemoryRecordStore::new());
        let sink = Arc::new(InMemoryBatchSink::new());
        let audit = audit_accumulator(&config, sink.clone());
        let service = TransferService::new(&config, ledger.clone(), records.clone(), audit);

        Harness {
            service,
            ledger,
            records,
            sink,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_transfer_writes_record_and_audit() {
        let h = harness(1000);
        let request = h.service.holding_transfer("alice", 100).unwrap();

        let receipt = h.service.execute_transfer(request).await.into_value();

        assert_eq!(h.ledger.balance(&AccountId::new("alice")), 900);
        assert_eq!(h.ledger.balance(&AccountId::new("holding")), 100);
        assert_eq!(h.records.len(), 1);

        let audited = h.sink.items_of(AUDIT_TRANSFER_COMMITTED);
        assert_eq!(audited.len(), 1);
        assert_eq!(audited[0].payload["state"], "EXECUTED");
        assert_eq!(audited[0].payload["record_id"], receipt.record_id.as_str());

        let record = h.service.read_record(&receipt.record_id).await.into_value();
        assert_eq!(record.amount, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_failure_rolls_back_balance() {
        let h = harness(1000);
        h.records.set_unavailable(true);
        let request = h.service.holding_transfer("alice", 100).unwrap();

        let error = h.service.execute_transfer(request).await.into_reason();

        assert_eq!(error.code(), "DEPENDENCY_UNAVAILABLE");
        assert!(!error.requires_reconciliation());
        assert_eq!(h.ledger.balance(&AccountId::new("alice")), 1000);
        assert_eq!(h.ledger.balance(&AccountId::new("holding")), 0);

        let audited = h.sink.items_of(AUDIT_TRANSFER_ROLLED_BACK);
        assert_eq!(audited.len(), 1);
        assert_eq!(audited[0].payload["state"], "ROLLED_BACK");
    }

    #[tokio::test(start_paused = true)]
    async fn test_insufficient_balance_is_not_attempted() {
        let h = harness(50);
        let request = h.service.holding_transfer("alice", 100).unwrap();

        let error = h.service.execute_transfer(request).await.into_reason();

        assert_eq!(
            error,
            ExecutionError::InsufficientResource {
                account: "alice".to_string(),
                required: 100,
                available: 50,
            }
        );
        assert_eq!(h.ledger.transfer_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_ledger_failure_is_retried() {
        let h = harness(1000);
        h.ledger.fail_next_transfers(2);
        let request = h.service.holding_transfer("alice", 100).unwrap();

        assert!(h.service.execute_transfer(request).await.is_success());
        assert_eq!(h.ledger.balance(&AccountId::new("alice")), 900);
        assert_eq!(h.service.ledger_breaker().state(), CircuitBreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_balance_read_is_cached_and_invalidated() {
        let h = harness(1000);
        let alice = AccountId::new("alice");

        assert_eq!(h.service.read_balance(&alice).await, Outcome::Success(1000));
        h.ledger.set_balance("alice", 5);
        assert_eq!(h.service.read_balance(&alice).await, Outcome::Success(1000));

        h.ledger.set_balance("alice", 1000);
        let request = h.service.holding_transfer("alice", 100).unwrap();
        assert!(h.service.execute_transfer(request).await.is_success());

        assert_eq!(h.service.read_balance(&alice).await, Outcome::Success(900));
    }

    #[tokio::test(start_paused = true)]
    async fn test_balance_cache_expires() {
        let h = harness(1000);
        let alice = AccountId::new("alice");

        assert_eq!(h.service.read_balance(&alice).await, Outcome::Success(1000));
        h.ledger.set_balance("alice", 7);
        tokio::time::advance(h.service.balance_cache().default_ttl() + Duration::from_millis(1)).await;

        assert_eq!(h.service.read_balance(&alice).await, Outcome::Success(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_record_is_not_found() {
        let h = harness(0);
        let error = h.service.read_record(&RecordId::new("missing")).await.into_reason();
        assert_eq!(error.code(), "RESOURCE_NOT_FOUND");
        assert!(h.service.record_cache().is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_request_is_rejected_before_running() {
        let h = harness(1000);
        assert!(h.service.holding_transfer("alice", 0).is_err());
        assert!(h.service.holding_transfer("holding", 5).is_err());
        assert!(h.service.holding_transfer("alice", 1_000_001).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_refuses_new_transfers() {
        let h = harness(1000);
        let report = h.service.shutdown().await;
        assert_eq!(report.drained, 0);

        let request = h.service.holding_transfer("alice", 100).unwrap();
        let error = h.service.execute_transfer(request).await.into_reason();
        assert_eq!(error.code(), "EXECUTION_ABORTED");
        assert_eq!(h.ledger.balance(&AccountId::new("alice")), 1000);
    }
}
