//! Batch Handler Port (Driven Port)
//!
//! Bulk sink for one kind of batched item.

use async_trait::async_trait;

use crate::batch::BatchItem;
use crate::error::ExecutionError;

/// Port for applying a group of same-kind items in one call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BatchHandler: Send + Sync {
    /// Apply `items` (all of kind `kind`, in insertion order).
    async fn handle(&self, kind: &str, items: Vec<BatchItem>) -> Result<(), ExecutionError>;
}
