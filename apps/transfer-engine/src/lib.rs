// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::items_after_statements
    )
)]

//! Transfer Engine - Resilient Execution Core
//!
//! Governs how a ledger transfer and its durable record are attempted,
//! cached, retried, circuit-broken and compensated on partial failure.
//!
//! # Architecture (Hexagonal)
//!
//! - **Components**: self-contained building blocks
//!   - `cache`: bounded TTL/LRU cache
//!   - `resilience`: circuit breaker, retry, their pipeline, bounded runner
//!   - `batch`: size/time-triggered batch accumulator
//!   - `command`: compensating transfer command and its state machine
//!   - `outcome`: success/failure return contract
//!
//! - **Application**: `TransferService` orchestrating the components
//!
//! - **Ports / Infrastructure**: ledger, record store and batch handler
//!   interfaces; resilient and in-memory adapters
//!
//! The dependency call path is `RetryPolicy(CircuitBreaker(call))`, built
//! as a visible [`ResiliencePipeline`] per dependency.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Application layer - orchestration services.
pub mod application;
pub mod batch;
pub mod cache;
pub mod command;
pub mod config;
pub mod error;
/// Infrastructure layer - port adapters.
pub mod infrastructure;
pub mod observability;
pub mod outcome;
pub mod ports;
pub mod resilience;

pub use application::{TransferService, audit_accumulator};
pub use batch::{BatchAccumulator, BatchConfig, BatchError, BatchItem, FlushReport};
pub use cache::{CacheKey, CacheStats, TtlCache};
pub use command::{
    AccountId, CommandId, CommandState, CompensatingCommand, LedgerTransferRequest, RecordId,
    TransferReceipt, TransferRecord,
};
pub use config::{ConfigError, EngineConfig, load_config, load_config_from_string};
pub use error::{
    Classify, CircuitBreakerError, CompensationFailure, ErrorCategory, ExecutionError,
};
pub use outcome::Outcome;
pub use ports::{BatchHandler, LedgerPort, RecordStorePort};
pub use resilience::{
    BackoffStrategy, BoundedTaskRunner, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState,
    ResiliencePipeline, RetryPolicy, RunError, ShutdownReport,
};
