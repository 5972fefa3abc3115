//! Application layer.
//!
//! Services coordinate the command, resilience and caching components over
//! the driven ports.

pub mod transfer_service;

pub use transfer_service::{AUDIT_KINDS, TransferService, audit_accumulator};
