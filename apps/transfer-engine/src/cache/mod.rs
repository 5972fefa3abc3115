//! Bounded key/value cache with TTL expiry and LRU eviction.
//!
//! Used for read-mostly state (balances, transfer records) so repeated reads
//! do not reach the ledger or record store.
//!
//! # Invariants
//!
//! - An expired entry is never returned; the read that discovers it evicts it.
//! - Population never exceeds capacity; inserting a new key at capacity
//!   evicts the least-recently-used entry first.
//! - A hit refreshes recency before any later eviction decision.
//! - All reads and writes on one cache go through a single async mutex, so
//!   get/evict/set are atomic with respect to each other.

mod entry;
mod key;
mod lru;
mod stats;
mod store;

pub use entry::CacheEntry;
pub use key::CacheKey;
pub use lru::LruTracker;
pub use stats::CacheStats;
pub use store::TtlCache;
