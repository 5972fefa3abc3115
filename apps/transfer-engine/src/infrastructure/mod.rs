//! Infrastructure adapters.
//!
//! Resilient wrappers for the driven ports, plus in-memory dependencies.

pub mod in_memory;
pub mod resilient;

pub use in_memory::{InMemoryBatchSink, InMemoryLedger, InMemoryRecordStore};
pub use resilient::{ResilientLedger, ResilientRecordStore};
