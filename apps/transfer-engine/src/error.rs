//! Error taxonomy for the transfer engine.
//!
//! Every failure the engine can produce is classified once, here, and the
//! classification drives both retry and circuit-breaker accounting.
//!
//! | Error | Category | Retried | Counts toward circuit |
//! |-------|----------|---------|-----------------------|
//! | `Validation` | Fatal | No | No |
//! | `NotFound` | Fatal | No | No |
//! | `InsufficientResource` | Fatal | No | No |
//! | `TransferRejected` | Fatal | No | No |
//! | `DependencyUnavailable` | Transient | Yes | Yes |
//! | `Timeout` | Transient | Yes | Yes |
//! | `CircuitOpen` | Transient | Yes | No (rejected before the call) |
//! | `BatchFlush` | Fatal | No | No |
//! | `Aborted` | Fatal | No | No |
//! | `Compensation` | Fatal | Never | No |
//!
//! `Compensation` leaves ledgers and records inconsistent. It is never folded
//! into another variant and always answers `requires_reconciliation()`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Retry classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Failure may succeed if attempted again (dependency down, timeout).
    Transient,
    /// Failure will not change on retry (bad input, business rule).
    Fatal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Classification seam shared by the retry policy and circuit breaker.
pub trait Classify {
    /// Category of this failure.
    fn category(&self) -> ErrorCategory;

    /// Whether this failure is worth another attempt.
    fn is_transient(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }
}

/// Failures produced by a circuit breaker rather than the guarded operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CircuitBreakerError {
    /// The circuit rejected the call without invoking the operation.
    #[error("Circuit '{name}' is open")]
    Open {
        /// Breaker (dependency) name.
        name: String,
    },

    /// The admitted call did not finish within the breaker's call timeout.
    #[error("Call through circuit '{name}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Breaker (dependency) name.
        name: String,
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
    },
}

/// A rollback that failed after the forward transfer had committed.
///
/// The subject has been debited and no record exists for it. Operators must
/// reconcile the two stores by hand.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Compensation failed for command {command_id} ({subject} -> {counterparty}, amount {amount}): \
     rollback error: {rollback_error}; original failure: {cause}"
)]
pub struct CompensationFailure {
    /// Command whose rollback failed.
    pub command_id: String,
    /// Account that was debited by the forward step.
    pub subject: String,
    /// Account that was credited by the forward step.
    pub counterparty: String,
    /// Amount left in flight.
    pub amount: i64,
    /// Failure of the record write that triggered the rollback.
    pub cause: Box<ExecutionError>,
    /// Failure of the rollback itself.
    pub rollback_error: Box<ExecutionError>,
}

/// Domain-level failures returned by engine entry points.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// Input failed validation.
    #[error("Validation failed for '{field}': {message}")]
    Validation {
        /// Offending field.
        field: String,
        /// What was wrong with it.
        message: String,
    },

    /// A referenced resource does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity type (e.g., "TransferRecord").
        entity: String,
        /// Identifier that was looked up.
        id: String,
    },

    /// The subject does not hold enough value for the transfer.
    #[error("Insufficient balance for {account}: required {required}, available {available}")]
    InsufficientResource {
        /// Account that was checked.
        account: String,
        /// Amount the operation needs.
        required: i64,
        /// Amount the account holds.
        available: i64,
    },

    /// The ledger declined the transfer.
    #[error("Transfer rejected by ledger: {reason}")]
    TransferRejected {
        /// Rejection reason.
        reason: String,
    },

    /// A downstream dependency could not be reached.
    #[error("Dependency '{dependency}' unavailable: {message}")]
    DependencyUnavailable {
        /// Dependency name.
        dependency: String,
        /// Error details.
        message: String,
    },

    /// A downstream dependency did not answer in time.
    #[error("Dependency '{dependency}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Dependency name.
        dependency: String,
        /// Timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The dependency's circuit breaker is rejecting calls.
    #[error("Circuit for '{dependency}' is open")]
    CircuitOpen {
        /// Dependency name.
        dependency: String,
    },

    /// A batch flush dropped items.
    #[error("Batch flush failed for kinds [{}]; {dropped_items} item(s) dropped", .failed_kinds.join(", "))]
    BatchFlush {
        /// Item kinds whose handler failed or was missing.
        failed_kinds: Vec<String>,
        /// Number of items that were not delivered.
        dropped_items: usize,
    },

    /// The operation was refused or did not run to completion.
    #[error("Execution aborted: {reason}")]
    Aborted {
        /// Why the operation stopped (shutdown, panic).
        reason: String,
    },

    /// Rollback failed after the forward step committed.
    #[error(transparent)]
    Compensation(Box<CompensationFailure>),
}

impl ExecutionError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a not-found error.
    #[must_use]
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create a dependency-unavailable error.
    #[must_use]
    pub fn unavailable(dependency: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DependencyUnavailable {
            dependency: dependency.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_FAILURE",
            Self::NotFound { .. } => "RESOURCE_NOT_FOUND",
            Self::InsufficientResource { .. } => "INSUFFICIENT_RESOURCE",
            Self::TransferRejected { .. } => "TRANSFER_REJECTED",
            Self::DependencyUnavailable { .. } => "DEPENDENCY_UNAVAILABLE",
            Self::Timeout { .. } => "DEPENDENCY_TIMEOUT",
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::BatchFlush { .. } => "BATCH_FLUSH_FAILED",
            Self::Aborted { .. } => "EXECUTION_ABORTED",
            Self::Compensation(_) => "COMPENSATION_FAILURE",
        }
    }

    /// Whether ledgers and records may now disagree and need manual repair.
    #[must_use]
    pub const fn requires_reconciliation(&self) -> bool {
        matches!(self, Self::Compensation(_))
    }

    /// Borrow the compensation failure, if this is one.
    #[must_use]
    pub fn as_compensation(&self) -> Option<&CompensationFailure> {
        match self {
            Self::Compensation(failure) => Some(failure.as_ref()),
            _ => None,
        }
    }
}

impl Classify for ExecutionError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::DependencyUnavailable { .. } | Self::Timeout { .. } | Self::CircuitOpen { .. } => {
                ErrorCategory::Transient
            }
            Self::Validation { .. }
            | Self::NotFound { .. }
            | Self::InsufficientResource { .. }
            | Self::TransferRejected { .. }
            | Self::BatchFlush { .. }
            | Self::Aborted { .. }
            | Self::Compensation(_) => ErrorCategory::Fatal,
        }
    }
}

impl From<CircuitBreakerError> for ExecutionError {
    fn from(error: CircuitBreakerError) -> Self {
        match error {
            CircuitBreakerError::Open { name } => Self::CircuitOpen { dependency: name },
            CircuitBreakerError::Timeout { name, timeout_ms } => Self::Timeout {
                dependency: name,
                timeout_ms,
            },
        }
    }
}

impl From<CompensationFailure> for ExecutionError {
    fn from(failure: CompensationFailure) -> Self {
        Self::Compensation(Box::new(failure))
    }
}
