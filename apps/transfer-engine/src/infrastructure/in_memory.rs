//! In-memory dependencies for development and testing.
//!
//! Each store can be told to fail, so resilience and compensation paths
//! can be driven without a real backend. Not for production use.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;

use crate::batch::BatchItem;
use crate::command::{AccountId, RecordId, TransferRecord};
use crate::error::ExecutionError;
use crate::ports::{BatchHandler, LedgerPort, RecordStorePort};

/// Failure switch shared by the in-memory stores.
///
/// `fail_next(n)` fails the next `n` calls; `set_unavailable(true)` fails
/// every call until cleared.
#[derive(Debug, Default)]
struct FailureInjector {
    remaining: AtomicU32,
    down: AtomicBool,
}

impl FailureInjector {
    fn check(&self, dependency: &str) -> Result<(), ExecutionError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(ExecutionError::unavailable(dependency, "injected outage"));
        }
        let consumed = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            Err(ExecutionError::unavailable(dependency, "injected failure"))
        } else {
            Ok(())
        }
    }
}

/// In-memory implementation of `LedgerPort`.
///
/// Unknown accounts hold 0. A transfer that would overdraw `from` is
/// declined with `Ok(false)`.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    balances: RwLock<HashMap<AccountId, i64>>,
    transfer_failures: FailureInjector,
    balance_failures: FailureInjector,
    transfers: AtomicUsize,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger with opening balances.
    #[must_use]
    pub fn with_balances<I, A>(balances: I) -> Self
    where
        I: IntoIterator<Item = (A, i64)>,
        A: Into<AccountId>,
    {
        let ledger = Self::new();
        for (account, balance) in balances {
            ledger.set_balance(account, balance);
        }
        ledger
    }

    /// Overwrite an account's balance (test setup).
    pub fn set_balance(&self, account: impl Into<AccountId>, balance: i64) {
        self.balances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(account.into(), balance);
    }

    /// Balance without going through the port.
    #[must_use]
    pub fn balance(&self, account: &AccountId) -> i64 {
        self.balances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(account)
            .copied()
            .unwrap_or(0)
    }

    /// Fail the next `count` transfers with `DependencyUnavailable`.
    pub fn fail_next_transfers(&self, count: u32) {
        self.transfer_failures.remaining.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` balance reads with `DependencyUnavailable`.
    pub fn fail_next_balance_reads(&self, count: u32) {
        self.balance_failures.remaining.store(count, Ordering::SeqCst);
    }

    /// Make every call fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.transfer_failures.down.store(unavailable, Ordering::SeqCst);
        self.balance_failures.down.store(unavailable, Ordering::SeqCst);
    }

    /// Transfers that reached the ledger, applied or declined.
    #[must_use]
    pub fn transfer_calls(&self) -> usize {
        self.transfers.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerPort for InMemoryLedger {
    async fn get_balance(&self, account: &AccountId) -> Result<i64, ExecutionError> {
        self.balance_failures.check("ledger")?;
        Ok(self.balance(account))
    }

    async fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: i64,
    ) -> Result<bool, ExecutionError> {
        self.transfer_failures.check("ledger")?;
        self.transfers.fetch_add(1, Ordering::SeqCst);

        let mut balances = self.balances.write().unwrap_or_else(PoisonError::into_inner);
        let available = balances.get(from).copied().unwrap_or(0);
        if available < amount {
            return Ok(false);
        }
        balances.insert(from.clone(), available - amount);
        *balances.entry(to.clone()).or_insert(0) += amount;
        Ok(true)
    }
}

/// In-memory implementation of `RecordStorePort`.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<RecordId, TransferRecord>>,
    write_failures: FailureInjector,
    read_failures: FailureInjector,
    reject_writes: AtomicBool,
}

impl InMemoryRecordStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no record is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a record directly (test setup).
    pub fn insert(&self, record: TransferRecord) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id.clone(), record);
    }

    /// Fail the next `count` writes with `DependencyUnavailable`.
    pub fn fail_next_writes(&self, count: u32) {
        self.write_failures.remaining.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` reads with `DependencyUnavailable`.
    pub fn fail_next_reads(&self, count: u32) {
        self.read_failures.remaining.store(count, Ordering::SeqCst);
    }

    /// Make every call fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.write_failures.down.store(unavailable, Ordering::SeqCst);
        self.read_failures.down.store(unavailable, Ordering::SeqCst);
    }

    /// Answer writes with `Ok(false)` instead of storing them.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStorePort for InMemoryRecordStore {
    async fn read(&self, id: &RecordId) -> Result<Option<TransferRecord>, ExecutionError> {
        self.read_failures.check("record_store")?;
        Ok(self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned())
    }

    async fn write(&self, record: &TransferRecord) -> Result<bool, ExecutionError> {
        self.write_failures.check("record_store")?;
        if self.reject_writes.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.insert(record.clone());
        Ok(true)
    }
}

/// `BatchHandler` that keeps every delivered group in memory.
#[derive(Debug, Default)]
pub struct InMemoryBatchSink {
    delivered: Mutex<Vec<(String, Vec<BatchItem>)>>,
    failing: AtomicBool,
}

impl InMemoryBatchSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups delivered so far, in delivery order.
    #[must_use]
    pub fn delivered(&self) -> Vec<(String, Vec<BatchItem>)> {
        self.delivered.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Every delivered item of `kind`, in delivery order.
    #[must_use]
    pub fn items_of(&self, kind: &str) -> Vec<BatchItem> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(k, _)| k == kind)
            .flat_map(|(_, items)| items.iter().cloned())
            .collect()
    }

    /// Fail every delivery (or accept again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl BatchHandler for InMemoryBatchSink {
    async fn handle(&self, kind: &str, items: Vec<BatchItem>) -> Result<(), ExecutionError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ExecutionError::unavailable("batch_sink", "injected failure"));
        }
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((kind.to_string(), items));
        Ok(())
    }
}
