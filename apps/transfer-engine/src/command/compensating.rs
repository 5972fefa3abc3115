//! Compensating command: ledger transfer plus durable record.
//!
//! Step 1 moves `amount` from the subject to the counterparty. Step 2 writes
//! the transfer record. If step 2 fails after step 1 committed, the transfer
//! is reversed. If the reversal fails too, the command ends in
//! `COMPENSATION_FAILED` and returns `ExecutionError::Compensation`, which
//! is never folded into an ordinary failure. Once the record is written the
//! transfer is final and cannot be rolled back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identifiers::{AccountId, CommandId, RecordId};
use super::request::{LedgerTransferRequest, TransferRecord};
use super::state::CommandState;
use crate::error::{CompensationFailure, ExecutionError};
use crate::observability::{metrics, new_error_id};
use crate::outcome::Outcome;
use crate::ports::{LedgerPort, RecordStorePort};

/// Proof of a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Command that performed the transfer.
    pub command_id: CommandId,
    /// Record written in step 2.
    pub record_id: RecordId,
    /// Debited account.
    pub subject: AccountId,
    /// Credited account.
    pub counterparty: AccountId,
    /// Amount moved.
    pub amount: i64,
    /// When the command finished.
    pub completed_at: DateTime<Utc>,
}

/// One transfer-and-record unit with single-level rollback.
#[derive(Debug)]
pub struct CompensatingCommand<L, R> {
    id: CommandId,
    request: LedgerTransferRequest,
    state: CommandState,
    record_id: Option<RecordId>,
    ledger: Arc<L>,
    records: Arc<R>,
}

impl<L: LedgerPort, R: RecordStorePort> CompensatingCommand<L, R> {
    /// Create a pending command.
    #[must_use]
    pub fn new(request: LedgerTransferRequest, ledger: Arc<L>, records: Arc<R>) -> Self {
        Self {
            id: CommandId::generate(),
            request,
            state: CommandState::Pending,
            record_id: None,
            ledger,
            records,
        }
    }

    /// Command id.
    #[must_use]
    pub const fn id(&self) -> &CommandId {
        &self.id
    }

    /// The validated request.
    #[must_use]
    pub const fn request(&self) -> &LedgerTransferRequest {
        &self.request
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> CommandState {
        self.state
    }

    /// Record written by step 2, once it has been acknowledged.
    #[must_use]
    pub const fn record_id(&self) -> Option<&RecordId> {
        self.record_id.as_ref()
    }

    /// Run both steps, rolling back step 1 if step 2 fails.
    ///
    /// # Panics
    ///
    /// Panics if called more than once on the same command.
    pub async fn execute(&mut self) -> Outcome<TransferReceipt, ExecutionError> {
        assert!(
            self.state == CommandState::Pending,
            "CompensatingCommand::execute called twice (command {} is {})",
            self.id,
            self.state
        );

        let subject = self.request.subject().clone();
        let counterparty = self.request.counterparty().clone();
        let amount = self.request.amount();

        let committed = match self.ledger.transfer(&subject, &counterparty, amount).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ExecutionError::TransferRejected {
                reason: format!("ledger declined transfer of {amount} from {subject}"),
            }),
            Err(error) => Err(error),
        };
        if let Err(error) = committed {
            self.transition(CommandState::Failed);
            tracing::info!(
                command_id = %self.id,
                subject = %subject,
                amount,
                error = %error,
                "Transfer did not commit"
            );
            return Outcome::failure(error);
        }
        self.transition(CommandState::Executed);

        let record = TransferRecord::for_request(&self.id, &self.request);
        let written = match self.records.write(&record).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ExecutionError::unavailable(
                "record_store",
                "write was not acknowledged",
            )),
            Err(error) => Err(error),
        };

        match written {
            Ok(()) => {
                tracing::info!(
                    command_id = %self.id,
                    record_id = %record.id,
                    subject = %subject,
                    counterparty = %counterparty,
                    amount,
                    "Transfer executed"
                );
                metrics::record_command_terminal(self.state.as_str());
                self.record_id = Some(record.id.clone());
                Outcome::success(TransferReceipt {
                    command_id: self.id.clone(),
                    record_id: record.id,
                    subject,
                    counterparty,
                    amount,
                    completed_at: Utc::now(),
                })
            }
            Err(cause) => {
                tracing::warn!(
                    command_id = %self.id,
                    error = %cause,
                    "Record write failed after transfer committed, rolling back"
                );
                match self.reverse().await {
                    Ok(()) => Outcome::failure(cause),
                    Err(rollback_error) => {
                        Outcome::failure(self.compensation_failed(cause, rollback_error))
                    }
                }
            }
        }
    }

    /// Undo step 1.
    ///
    /// A no-op success when step 1 never committed or was already undone.
    /// After a compensation failure the reversal is attempted again, and the
    /// command moves to `ROLLED_BACK` only if it succeeds.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::Validation` when the record was already
    /// written, and `ExecutionError::Compensation` when the reversal fails.
    pub async fn rollback(&mut self) -> Result<(), ExecutionError> {
        if !self.state.is_committed() {
            return Ok(());
        }
        if let Some(record_id) = &self.record_id {
            return Err(ExecutionError::validation(
                "state",
                format!("record {record_id} is written; transfer {} is final", self.id),
            ));
        }

        let reason = if self.state == CommandState::CompensationFailed {
            "reversal retried after compensation failure"
        } else {
            "rollback requested"
        };
        match self.reverse().await {
            Ok(()) => Ok(()),
            Err(rollback_error) => Err(self.compensation_failed(
                ExecutionError::Aborted {
                    reason: reason.to_string(),
                },
                rollback_error,
            )),
        }
    }

    /// Move the amount back. Leaves the state unchanged on failure.
    async fn reverse(&mut self) -> Result<(), ExecutionError> {
        let subject = self.request.subject();
        let counterparty = self.request.counterparty();
        let amount = self.request.amount();

        let reversed = match self.ledger.transfer(counterparty, subject, amount).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ExecutionError::TransferRejected {
                reason: format!("ledger declined reversal of {amount} to {subject}"),
            }),
            Err(error) => Err(error),
        };

        if reversed.is_ok() {
            self.transition(CommandState::RolledBack);
            tracing::info!(command_id = %self.id, amount, "Transfer rolled back");
        }
        reversed
    }

    fn compensation_failed(
        &mut self,
        cause: ExecutionError,
        rollback_error: ExecutionError,
    ) -> ExecutionError {
        if self.state != CommandState::CompensationFailed {
            self.transition(CommandState::CompensationFailed);
            metrics::record_command_terminal(self.state.as_str());
        }
        metrics::record_compensation_failure();

        let error_id = new_error_id();
        tracing::error!(
            error_id = %error_id,
            command_id = %self.id,
            subject = %self.request.subject(),
            counterparty = %self.request.counterparty(),
            amount = self.request.amount(),
            cause = %cause,
            rollback_error = %rollback_error,
            "Compensation failed; manual reconciliation required"
        );

        CompensationFailure {
            command_id: self.id.to_string(),
            subject: self.request.subject().to_string(),
            counterparty: self.request.counterparty().to_string(),
            amount: self.request.amount(),
            cause: Box::new(cause),
            rollback_error: Box::new(rollback_error),
        }
        .into()
    }

    fn transition(&mut self, to: CommandState) {
        debug_assert!(
            CommandState::is_valid_transition(self.state, to),
            "invalid command transition {} -> {}",
            self.state,
            to
        );
        tracing::debug!(command_id = %self.id, from = %self.state, to = %to, "Command state changed");
        self.state = to;
        if to.is_terminal() {
            metrics::record_command_terminal(to.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use mockall::Sequence;
    use mockall::predicate::eq;

    use super::*;
    use crate::ports::{MockLedgerPort, MockRecordStorePort};

    fn request() -> LedgerTransferRequest {
        LedgerTransferRequest::new("alice", "holding", 100).unwrap()
    }

    fn command(
        ledger: MockLedgerPort,
        records: MockRecordStorePort,
    ) -> CompensatingCommand<MockLedgerPort, MockRecordStorePort> {
        CompensatingCommand::new(request(), Arc::new(ledger), Arc::new(records))
    }

    #[tokio::test]
    async fn both_steps_commit() {
        let mut ledger = MockLedgerPort::new();
        ledger
            .expect_transfer()
            .with(
                eq(AccountId::new("alice")),
                eq(AccountId::new("holding")),
                eq(100),
            )
            .times(1)
            .returning(|_, _, _| Ok(true));
        let mut records = MockRecordStorePort::new();
        records.expect_write().times(1).returning(|_| Ok(true));

        let mut command = command(ledger, records);
        let outcome = command.execute().await;

        assert!(outcome.is_success());
        assert_eq!(outcome.value().amount, 100);
        assert_eq!(command.state(), CommandState::Executed);
        assert_eq!(command.record_id(), Some(&outcome.value().record_id));
    }

    #[tokio::test]
    async fn rollback_after_record_written_is_refused() {
        let mut ledger = MockLedgerPort::new();
        // Only the forward transfer; a reversal would be a second call.
        ledger.expect_transfer().times(1).returning(|_, _, _| Ok(true));
        let mut records = MockRecordStorePort::new();
        records.expect_write().times(1).returning(|_| Ok(true));

        let mut command = command(ledger, records);
        assert!(command.execute().await.is_success());

        let error = command.rollback().await.unwrap_err();
        assert_eq!(error.code(), "VALIDATION_FAILURE");
        assert!(!error.requires_reconciliation());
        assert_eq!(command.state(), CommandState::Executed);
    }

    #[tokio::test]
    async fn step_one_failure_needs_no_compensation() {
        let mut ledger = MockLedgerPort::new();
        ledger
            .expect_transfer()
            .times(1)
            .returning(|_, _, _| Err(ExecutionError::unavailable("ledger", "down")));
        let mut records = MockRecordStorePort::new();
        records.expect_write().never();

        let mut command = command(ledger, records);
        let outcome = command.execute().await;

        assert_eq!(outcome.reason().code(), "DEPENDENCY_UNAVAILABLE");
        assert_eq!(command.state(), CommandState::Failed);
    }

    #[tokio::test]
    async fn declined_transfer_is_rejection() {
        let mut ledger = MockLedgerPort::new();
        ledger.expect_transfer().times(1).returning(|_, _, _| Ok(false));
        let records = MockRecordStorePort::new();

        let mut command = command(ledger, records);
        let outcome = command.execute().await;

        assert_eq!(outcome.reason().code(), "TRANSFER_REJECTED");
        assert_eq!(command.state(), CommandState::Failed);
    }

    #[tokio::test]
    async fn record_failure_rolls_back() {
        let mut seq = Sequence::new();
        let mut ledger = MockLedgerPort::new();
        let mut records = MockRecordStorePort::new();
        ledger
            .expect_transfer()
            .with(
                eq(AccountId::new("alice")),
                eq(AccountId::new("holding")),
                eq(100),
            )
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(true));
        records
            .expect_write()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ExecutionError::unavailable("record_store", "down")));
        ledger
            .expect_transfer()
            .with(
                eq(AccountId::new("holding")),
                eq(AccountId::new("alice")),
                eq(100),
            )
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(true));

        let mut command = command(ledger, records);
        let outcome = command.execute().await;

        assert_eq!(outcome.reason().code(), "DEPENDENCY_UNAVAILABLE");
        assert!(!outcome.reason().requires_reconciliation());
        assert_eq!(command.state(), CommandState::RolledBack);
    }

    #[tokio::test]
    async fn unacknowledged_write_rolls_back() {
        let mut ledger = MockLedgerPort::new();
        ledger.expect_transfer().times(2).returning(|_, _, _| Ok(true));
        let mut records = MockRecordStorePort::new();
        records.expect_write().times(1).returning(|_| Ok(false));

        let mut command = command(ledger, records);
        let outcome = command.execute().await;

        assert!(outcome.is_failure());
        assert_eq!(command.state(), CommandState::RolledBack);
    }

    #[tokio::test]
    async fn failed_rollback_is_compensation_failure() {
        let mut seq = Sequence::new();
        let mut ledger = MockLedgerPort::new();
        let mut records = MockRecordStorePort::new();
        ledger
            .expect_transfer()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(true));
        records
            .expect_write()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ExecutionError::unavailable("record_store", "down")));
        ledger
            .expect_transfer()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(ExecutionError::unavailable("ledger", "down")));

        let mut command = command(ledger, records);
        let outcome = command.execute().await;

        let error = outcome.into_reason();
        assert!(error.requires_reconciliation());
        let failure = error.as_compensation().unwrap();
        assert_eq!(failure.subject, "alice");
        assert_eq!(failure.amount, 100);
        assert_eq!(failure.cause.code(), "DEPENDENCY_UNAVAILABLE");
        assert_eq!(command.state(), CommandState::CompensationFailed);
        assert!(command.record_id().is_none());
    }

    fn compensation_failed_ledger(seq: &mut Sequence) -> (MockLedgerPort, MockRecordStorePort) {
        let mut ledger = MockLedgerPort::new();
        let mut records = MockRecordStorePort::new();
        ledger
            .expect_transfer()
            .times(1)
            .in_sequence(seq)
            .returning(|_, _, _| Ok(true));
        records
            .expect_write()
            .times(1)
            .in_sequence(seq)
            .returning(|_| Err(ExecutionError::unavailable("record_store", "down")));
        ledger
            .expect_transfer()
            .times(1)
            .in_sequence(seq)
            .returning(|_, _, _| Err(ExecutionError::unavailable("ledger", "down")));
        (ledger, records)
    }

    #[tokio::test]
    async fn rollback_after_compensation_failure_retries_reversal() {
        let mut seq = Sequence::new();
        let (mut ledger, records) = compensation_failed_ledger(&mut seq);
        ledger
            .expect_transfer()
            .with(
                eq(AccountId::new("holding")),
                eq(AccountId::new("alice")),
                eq(100),
            )
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(true));

        let mut command = command(ledger, records);
        assert!(command.execute().await.reason().requires_reconciliation());
        assert_eq!(command.state(), CommandState::CompensationFailed);

        command.rollback().await.unwrap();
        assert_eq!(command.state(), CommandState::RolledBack);

        // Already undone.
        command.rollback().await.unwrap();
        assert_eq!(command.state(), CommandState::RolledBack);
    }

    #[tokio::test]
    async fn rollback_after_compensation_failure_reports_it_again() {
        let mut seq = Sequence::new();
        let (mut ledger, records) = compensation_failed_ledger(&mut seq);
        ledger
            .expect_transfer()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(ExecutionError::unavailable("ledger", "still down")));

        let mut command = command(ledger, records);
        let _ = command.execute().await;

        let error = command.rollback().await.unwrap_err();
        assert!(error.requires_reconciliation());
        let failure = error.as_compensation().unwrap();
        assert_eq!(failure.amount, 100);
        assert_eq!(failure.rollback_error.code(), "DEPENDENCY_UNAVAILABLE");
        assert_eq!(command.state(), CommandState::CompensationFailed);
    }

    #[tokio::test]
    async fn rollback_without_commit_is_noop() {
        let mut ledger = MockLedgerPort::new();
        ledger.expect_transfer().never();
        let mut command = command(ledger, MockRecordStorePort::new());

        command.rollback().await.unwrap();
        assert_eq!(command.state(), CommandState::Pending);
    }

    #[tokio::test]
    #[should_panic(expected = "execute called twice")]
    async fn second_execute_panics() {
        let mut ledger = MockLedgerPort::new();
        ledger.expect_transfer().returning(|_, _, _| Ok(false));
        let mut command = command(ledger, MockRecordStorePort::new());

        let _ = command.execute().await;
        let _ = command.execute().await;
    }
}
