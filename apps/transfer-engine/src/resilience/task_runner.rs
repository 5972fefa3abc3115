//! Bounded concurrent execution with graceful drain.
//!
//! Each admitted operation runs on its own Tokio task. Dropping the caller's
//! future stops waiting for the result but never cancels the operation, so a
//! command that has started always reaches a terminal state.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;

use crate::error::ExecutionError;
use crate::observability::metrics;

/// Why `run` did not return the operation's value.
#[derive(Debug, Error)]
pub enum RunError<E> {
    /// The operation returned an error.
    #[error("{0}")]
    Operation(E),

    /// The operation panicked.
    #[error("Operation panicked: {message}")]
    Panicked {
        /// Panic payload, when it was a string.
        message: String,
    },

    /// Admission was refused because the runner is shutting down.
    #[error("Runner '{runner}' is shutting down")]
    ShuttingDown {
        /// Runner name.
        runner: String,
    },
}

impl From<RunError<Self>> for ExecutionError {
    fn from(error: RunError<Self>) -> Self {
        match error {
            RunError::Operation(error) => error,
            RunError::Panicked { message } => Self::Aborted {
                reason: format!("operation panicked: {message}"),
            },
            RunError::ShuttingDown { runner } => Self::Aborted {
                reason: format!("runner '{runner}' is shutting down"),
            },
        }
    }
}

/// A failure observed while draining.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Runner-assigned task id.
    pub task_id: u64,
    /// Rendered error or panic message.
    pub message: String,
    /// Whether the task panicked.
    pub panicked: bool,
}

/// Result of [`BoundedTaskRunner::shutdown`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    /// Operations that completed after shutdown started.
    pub drained: u64,
    /// Failures among the drained operations.
    pub failures: Vec<TaskFailure>,
}

#[derive(Debug, Default)]
struct DrainLog {
    drained: u64,
    failures: Vec<TaskFailure>,
}

/// Caps how many operations run at once.
#[derive(Debug)]
pub struct BoundedTaskRunner {
    name: String,
    max_concurrent: usize,
    slots: Arc<Semaphore>,
    tracker: TaskTracker,
    admission: Mutex<()>,
    live: Arc<Mutex<HashMap<u64, Instant>>>,
    drain_log: Arc<Mutex<DrainLog>>,
    next_id: AtomicU64,
}

/// Removes a task from the live set and frees its slot on every exit path.
struct LiveGuard {
    runner: String,
    id: u64,
    live: Arc<Mutex<HashMap<u64, Instant>>>,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        let mut live = lock(&self.live);
        live.remove(&self.id);
        let remaining = live.len();
        drop(live);
        metrics::update_runner_in_flight(&self.runner, remaining);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl BoundedTaskRunner {
    /// Create a runner admitting at most `max_concurrent` operations (at least 1).
    #[must_use]
    pub fn new(name: impl Into<String>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            name: name.into(),
            max_concurrent,
            slots: Arc::new(Semaphore::new(max_concurrent)),
            tracker: TaskTracker::new(),
            admission: Mutex::new(()),
            live: Arc::new(Mutex::new(HashMap::new())),
            drain_log: Arc::new(Mutex::new(DrainLog::default())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Runner name used in logs and metrics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Admission limit.
    #[must_use]
    pub const fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Operations currently running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        lock(&self.live).len()
    }

    /// How long the oldest running operation has been running.
    #[must_use]
    pub fn oldest_in_flight(&self) -> Option<Duration> {
        lock(&self.live).values().min().map(Instant::elapsed)
    }

    /// Free admission slots.
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Whether shutdown has started.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Run `operation` once a slot is free.
    ///
    /// Suspends while all slots are taken. The slot is released and the
    /// live entry removed however the operation ends. The closed check and
    /// the spawn happen under the admission lock, so an operation is either
    /// refused or tracked by a concurrent `shutdown`.
    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, RunError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| self.shutting_down::<E>())?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let tracker = self.tracker.clone();
        let drain_log = Arc::clone(&self.drain_log);

        let handle = {
            let _admission = lock(&self.admission);
            if self.tracker.is_closed() {
                return Err(self.shutting_down());
            }

            let in_flight = {
                let mut live = lock(&self.live);
                live.insert(id, Instant::now());
                live.len()
            };
            metrics::update_runner_in_flight(&self.name, in_flight);
            let guard = LiveGuard {
                runner: self.name.clone(),
                id,
                live: Arc::clone(&self.live),
                _permit: permit,
            };

            self.tracker.spawn(async move {
                let _guard = guard;
                let outcome = AssertUnwindSafe(async move { operation().await })
                    .catch_unwind()
                    .await;

                if tracker.is_closed() {
                    let failure = match &outcome {
                        Ok(Ok(_)) => None,
                        Ok(Err(error)) => Some(TaskFailure {
                            task_id: id,
                            message: error.to_string(),
                            panicked: false,
                        }),
                        Err(payload) => Some(TaskFailure {
                            task_id: id,
                            message: panic_message(&*payload),
                            panicked: true,
                        }),
                    };
                    let mut log = lock(&drain_log);
                    log.drained += 1;
                    log.failures.extend(failure);
                }

                match outcome {
                    Ok(result) => result.map_err(RunError::Operation),
                    Err(payload) => {
                        let message = panic_message(&*payload);
                        tracing::error!(task_id = id, message = %message, "Operation panicked");
                        Err(RunError::Panicked { message })
                    }
                }
            })
        };

        match handle.await {
            Ok(result) => result,
            Err(join_error) => {
                tracing::warn!(task_id = id, error = %join_error, "Operation task did not complete");
                Err(self.shutting_down())
            }
        }
    }

    /// Stop admitting and wait for every running operation to finish.
    ///
    /// Failures of drained operations are collected, never re-raised.
    /// Running operations are not cancelled.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.slots.close();
        {
            let _admission = lock(&self.admission);
            self.tracker.close();
        }
        tracing::info!(
            runner = %self.name,
            in_flight = self.in_flight(),
            oldest_in_flight = ?self.oldest_in_flight(),
            "Draining task runner"
        );

        self.tracker.wait().await;

        let log = std::mem::take(&mut *lock(&self.drain_log));
        tracing::info!(
            runner = %self.name,
            drained = log.drained,
            failures = log.failures.len(),
            "Task runner drained"
        );
        ShutdownReport {
            drained: log.drained,
            failures: log.failures,
        }
    }

    fn shutting_down<E>(&self) -> RunError<E> {
        RunError::ShuttingDown {
            runner: self.name.clone(),
        }
    }
}
