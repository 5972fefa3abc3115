//! Ledger business rules.

use serde::{Deserialize, Serialize};

use crate::command::DEFAULT_MAX_TRANSFER_AMOUNT;

/// Ledger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Account credited by transfers into holding.
    #[serde(default = "default_holding_account")]
    pub holding_account: String,
    /// Largest amount a single transfer may move.
    #[serde(default = "default_max_transfer_amount")]
    pub max_transfer_amount: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            holding_account: default_holding_account(),
            max_transfer_amount: default_max_transfer_amount(),
        }
    }
}

fn default_holding_account() -> String {
    "holding".to_string()
}

const fn default_max_transfer_amount() -> i64 {
    DEFAULT_MAX_TRANSFER_AMOUNT
}
