//! Batched writes for high-volume, lower-durability items (audit events).

mod accumulator;
mod item;

pub use accumulator::{BatchAccumulator, BatchConfig, BatchError, FlushReport, GroupReport};
pub use item::BatchItem;
