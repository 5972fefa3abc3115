//! Size- and time-triggered batch accumulator.
//!
//! Items are buffered and applied in bulk, grouped by kind. Delivery is
//! at-most-once: a group whose handler fails is dropped, not requeued.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::item::BatchItem;
use crate::error::ExecutionError;
use crate::observability::metrics;
use crate::ports::BatchHandler;

/// Accumulator thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Pending items that trigger a flush (default: 100).
    pub batch_size: usize,
    /// Age of the last flush that triggers the next one (default: 5s).
    pub flush_interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval: Duration::from_secs(5),
        }
    }
}

/// Flush failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// One or more groups could not be applied; their items were dropped.
    #[error("Batch flush failed for kinds [{}]; {dropped_items} item(s) dropped", .failed_kinds.join(", "))]
    FlushFailed {
        /// Kinds whose handler failed or was not registered.
        failed_kinds: Vec<String>,
        /// Items in the failed groups.
        dropped_items: usize,
        /// Items applied by the groups that succeeded.
        delivered_items: usize,
    },
}

impl From<BatchError> for ExecutionError {
    fn from(error: BatchError) -> Self {
        match error {
            BatchError::FlushFailed {
                failed_kinds,
                dropped_items,
                ..
            } => Self::BatchFlush {
                failed_kinds,
                dropped_items,
            },
        }
    }
}

/// One group applied by a flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupReport {
    /// Item kind.
    pub kind: String,
    /// Items in the group.
    pub items: usize,
}

/// Result of a successful flush.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushReport {
    /// Items applied.
    pub items: usize,
    /// Groups in dispatch order.
    pub groups: Vec<GroupReport>,
}

#[derive(Debug)]
struct Pending {
    items: Vec<BatchItem>,
    last_flush: Instant,
}

/// Buffers items and flushes them by size or age.
pub struct BatchAccumulator {
    config: BatchConfig,
    handlers: HashMap<String, Arc<dyn BatchHandler>>,
    pending: Mutex<Pending>,
}

impl std::fmt::Debug for BatchAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchAccumulator")
            .field("config", &self.config)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl BatchAccumulator {
    /// Create an accumulator with no handlers. A batch size of 0 is treated as 1.
    #[must_use]
    pub fn new(mut config: BatchConfig) -> Self {
        config.batch_size = config.batch_size.max(1);
        Self {
            config,
            handlers: HashMap::new(),
            pending: Mutex::new(Pending {
                items: Vec::new(),
                last_flush: Instant::now(),
            }),
        }
    }

    /// Register the bulk handler for `kind`.
    #[must_use]
    pub fn with_handler(mut self, kind: impl Into<String>, handler: Arc<dyn BatchHandler>) -> Self {
        self.handlers.insert(kind.into(), handler);
        self
    }

    /// Thresholds in effect.
    #[must_use]
    pub const fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Items waiting for the next flush.
    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.items.len()
    }

    /// Append an item, flushing if a threshold is crossed.
    ///
    /// Returns the flush report when this call triggered a flush.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::FlushFailed` when the triggered flush dropped items.
    pub async fn add(&self, item: BatchItem) -> Result<Option<FlushReport>, BatchError> {
        let batch = {
            let mut pending = self.pending.lock().await;
            pending.items.push(item);
            let full = pending.items.len() >= self.config.batch_size;
            let stale = pending.last_flush.elapsed() > self.config.flush_interval;
            if full || stale {
                Some(Self::take(&mut pending))
            } else {
                None
            }
        };

        match batch {
            Some(items) => self.dispatch(items).await.map(Some),
            None => Ok(None),
        }
    }

    /// Flush everything pending now.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::FlushFailed` when any group was dropped.
    pub async fn flush(&self) -> Result<FlushReport, BatchError> {
        let items = {
            let mut pending = self.pending.lock().await;
            if pending.items.is_empty() {
                return Ok(FlushReport::default());
            }
            Self::take(&mut pending)
        };
        self.dispatch(items).await
    }

    /// Flush if items are pending and the interval has passed.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::FlushFailed` when any group was dropped.
    pub async fn flush_if_due(&self) -> Result<Option<FlushReport>, BatchError> {
        let items = {
            let mut pending = self.pending.lock().await;
            if pending.items.is_empty()
                || pending.last_flush.elapsed() <= self.config.flush_interval
            {
                return Ok(None);
            }
            Self::take(&mut pending)
        };
        self.dispatch(items).await.map(Some)
    }

    /// Evaluate the time threshold in the background.
    ///
    /// Checks twice per flush interval. On cancellation the task flushes
    /// whatever is pending and exits.
    pub fn spawn_periodic_flush(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let accumulator = Arc::clone(self);
        let period = (accumulator.config.flush_interval / 2).max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        if let Err(error) = accumulator.flush().await {
                            tracing::error!(error = %error, "Final batch flush failed");
                        }
                        tracing::debug!("Periodic batch flusher stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(error) = accumulator.flush_if_due().await {
                            tracing::error!(error = %error, "Periodic batch flush failed");
                        }
                    }
                }
            }
        })
    }

    fn take(pending: &mut Pending) -> Vec<BatchItem> {
        pending.last_flush = Instant::now();
        std::mem::take(&mut pending.items)
    }

    /// Group by kind (first-appearance order, insertion order within a
    /// group) and hand each group to its handler.
    async fn dispatch(&self, items: Vec<BatchItem>) -> Result<FlushReport, BatchError> {
        let total = items.len();
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<BatchItem>> = HashMap::new();
        for item in items {
            if !groups.contains_key(&item.kind) {
                order.push(item.kind.clone());
            }
            groups.entry(item.kind.clone()).or_default().push(item);
        }

        let mut report = FlushReport::default();
        let mut failed_kinds = Vec::new();
        let mut dropped_items = 0;

        for kind in order {
            let Some(group) = groups.remove(&kind) else {
                continue;
            };
            let count = group.len();
            let result = match self.handlers.get(&kind) {
                Some(handler) => handler.handle(&kind, group).await,
                None => Err(ExecutionError::not_found("BatchHandler", kind.clone())),
            };

            metrics::record_batch_group(&kind, count, result.is_ok());
            match result {
                Ok(()) => {
                    report.items += count;
                    report.groups.push(GroupReport { kind, items: count });
                }
                Err(error) => {
                    tracing::error!(kind = %kind, items = count, error = %error, "Batch group dropped");
                    dropped_items += count;
                    failed_kinds.push(kind);
                }
            }
        }

        tracing::debug!(
            total,
            delivered = report.items,
            dropped = dropped_items,
            "Batch flushed"
        );

        if failed_kinds.is_empty() {
            Ok(report)
        } else {
            Err(BatchError::FlushFailed {
                failed_kinds,
                dropped_items,
                delivered_items: report.items,
            })
        }
    }
}
