//! Compensating command state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a compensating command.
///
/// ```text
/// PENDING → EXECUTED (ledger transfer committed)
/// PENDING → FAILED (ledger transfer never committed)
/// EXECUTED → ROLLED_BACK (record write failed, transfer reversed)
/// EXECUTED → COMPENSATION_FAILED (record write failed, reversal failed)
/// COMPENSATION_FAILED → ROLLED_BACK (reversal retried and succeeded)
/// ```
///
/// `EXECUTED` is final for a command whose record was written.
/// `COMPENSATION_FAILED` stays open until a retried reversal succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandState {
    /// Not yet executed.
    Pending,
    /// Forward transfer committed.
    Executed,
    /// Forward transfer did not commit; nothing to undo.
    Failed,
    /// Forward transfer reversed after a later step failed.
    RolledBack,
    /// Reversal failed; ledgers and records need manual reconciliation.
    CompensationFailed,
}

impl CommandState {
    /// Check if a state transition is valid.
    #[must_use]
    pub const fn is_valid_transition(from: Self, to: Self) -> bool {
        matches!(
            (from, to),
            (Self::Pending, Self::Executed)
                | (Self::Pending, Self::Failed)
                | (Self::Executed, Self::RolledBack)
                | (Self::Executed, Self::CompensationFailed)
                | (Self::CompensationFailed, Self::RolledBack)
        )
    }

    /// Get all valid next states.
    #[must_use]
    pub fn valid_next_states(self) -> Vec<Self> {
        match self {
            Self::Pending => vec![Self::Executed, Self::Failed],
            Self::Executed => vec![Self::RolledBack, Self::CompensationFailed],
            Self::CompensationFailed => vec![Self::RolledBack],
            Self::Failed | Self::RolledBack => vec![],
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::RolledBack)
    }

    /// Whether the forward transfer is currently in effect.
    #[must_use]
    pub const fn is_committed(self) -> bool {
        matches!(self, Self::Executed | Self::CompensationFailed)
    }

    /// Stable upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Executed => "EXECUTED",
            Self::Failed => "FAILED",
            Self::RolledBack => "ROLLED_BACK",
            Self::CompensationFailed => "COMPENSATION_FAILED",
        }
    }
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
