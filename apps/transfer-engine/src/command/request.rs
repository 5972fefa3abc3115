//! Validated transfer request and the record it produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identifiers::{AccountId, CommandId, RecordId};
use crate::error::ExecutionError;

/// Largest amount accepted when no explicit limit is configured.
pub const DEFAULT_MAX_TRANSFER_AMOUNT: i64 = 1_000_000;

/// A transfer of `amount` from `subject` to `counterparty`.
///
/// Can only be built through validation, so `amount > 0` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerTransferRequest {
    subject: AccountId,
    counterparty: AccountId,
    amount: i64,
    reference: Option<String>,
}

impl LedgerTransferRequest {
    /// Validate a request against the default amount limit.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::Validation` when an account id is empty, both
    /// accounts are the same, or the amount is not in `1..=1_000_000`.
    pub fn new(
        subject: impl Into<AccountId>,
        counterparty: impl Into<AccountId>,
        amount: i64,
    ) -> Result<Self, ExecutionError> {
        Self::with_limit(subject, counterparty, amount, DEFAULT_MAX_TRANSFER_AMOUNT)
    }

    /// Validate a request against `max_amount`.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new) with `max_amount` as the upper bound.
    pub fn with_limit(
        subject: impl Into<AccountId>,
        counterparty: impl Into<AccountId>,
        amount: i64,
        max_amount: i64,
    ) -> Result<Self, ExecutionError> {
        let subject = subject.into();
        let counterparty = counterparty.into();

        if subject.as_str().trim().is_empty() {
            return Err(ExecutionError::validation("subject", "account id must not be empty"));
        }
        if counterparty.as_str().trim().is_empty() {
            return Err(ExecutionError::validation(
                "counterparty",
                "account id must not be empty",
            ));
        }
        if subject == counterparty {
            return Err(ExecutionError::validation(
                "counterparty",
                "cannot transfer to the same account",
            ));
        }
        if amount <= 0 {
            return Err(ExecutionError::validation("amount", "amount must be positive"));
        }
        if amount > max_amount {
            return Err(ExecutionError::validation(
                "amount",
                format!("amount exceeds limit of {max_amount}"),
            ));
        }

        Ok(Self {
            subject,
            counterparty,
            amount,
            reference: None,
        })
    }

    /// Attach a caller reference carried into the record.
    #[must_use]
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Account debited by the transfer.
    #[must_use]
    pub const fn subject(&self) -> &AccountId {
        &self.subject
    }

    /// Account credited by the transfer.
    #[must_use]
    pub const fn counterparty(&self) -> &AccountId {
        &self.counterparty
    }

    /// Amount moved (always positive).
    #[must_use]
    pub const fn amount(&self) -> i64 {
        self.amount
    }

    /// Caller reference, if any.
    #[must_use]
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }
}

/// Durable record of a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Record id.
    pub id: RecordId,
    /// Command that wrote the record.
    pub command_id: CommandId,
    /// Debited account.
    pub subject: AccountId,
    /// Credited account.
    pub counterparty: AccountId,
    /// Amount moved.
    pub amount: i64,
    /// Caller reference.
    pub reference: Option<String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

impl TransferRecord {
    /// Build the record for `request`.
    #[must_use]
    pub fn for_request(command_id: &CommandId, request: &LedgerTransferRequest) -> Self {
        Self {
            id: RecordId::generate(),
            command_id: command_id.clone(),
            subject: request.subject.clone(),
            counterparty: request.counterparty.clone(),
            amount: request.amount,
            reference: request.reference.clone(),
            created_at: Utc::now(),
        }
    }
}
