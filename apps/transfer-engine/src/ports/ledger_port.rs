//! Ledger Port (Driven Port)
//!
//! Interface for reading balances and moving value between accounts.

use async_trait::async_trait;

use crate::command::AccountId;
use crate::error::ExecutionError;

/// Port for the ledger service.
///
/// Both operations fail with `ExecutionError::DependencyUnavailable` when
/// the ledger cannot be reached.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerPort: Send + Sync {
    /// Current balance of `account`.
    async fn get_balance(&self, account: &AccountId) -> Result<i64, ExecutionError>;

    /// Debit `from` and credit `to` by `amount`.
    ///
    /// `Ok(false)` means the ledger declined the transfer (for example,
    /// insufficient funds) and nothing moved.
    async fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: i64,
    ) -> Result<bool, ExecutionError>;
}
