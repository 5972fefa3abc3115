//! Compensating transfer command.
//!
//! A validated [`LedgerTransferRequest`] becomes a [`CompensatingCommand`]
//! that commits a ledger transfer, writes a [`TransferRecord`], and reverses
//! the transfer if the record cannot be written.

mod compensating;
mod identifiers;
mod request;
mod state;

pub use compensating::{CompensatingCommand, TransferReceipt};
pub use identifiers::{AccountId, CommandId, RecordId};
pub use request::{DEFAULT_MAX_TRANSFER_AMOUNT, LedgerTransferRequest, TransferRecord};
pub use state::CommandState;
