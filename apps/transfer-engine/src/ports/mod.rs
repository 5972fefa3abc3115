//! Capability interfaces (driven ports).
//!
//! The engine reaches its dependencies only through these traits. Any
//! implementation satisfies them, real storage or a test double.

mod batch_handler_port;
mod ledger_port;
mod record_store_port;

pub use batch_handler_port::BatchHandler;
pub use ledger_port::LedgerPort;
pub use record_store_port::RecordStorePort;

#[cfg(test)]
pub use batch_handler_port::MockBatchHandler;
#[cfg(test)]
pub use ledger_port::MockLedgerPort;
#[cfg(test)]
pub use record_store_port::MockRecordStorePort;
