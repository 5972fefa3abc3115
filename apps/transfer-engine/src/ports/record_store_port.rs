//! Record Store Port (Driven Port)
//!
//! Interface for durable transfer records.

use async_trait::async_trait;

use crate::command::{RecordId, TransferRecord};
use crate::error::ExecutionError;

/// Port for the record store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStorePort: Send + Sync {
    /// Read a record, `None` when absent.
    async fn read(&self, id: &RecordId) -> Result<Option<TransferRecord>, ExecutionError>;

    /// Durably write a record. `Ok(false)` means the write was not accepted.
    async fn write(&self, record: &TransferRecord) -> Result<bool, ExecutionError>;
}
