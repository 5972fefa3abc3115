//! Cache entry with time-to-live.

use std::time::Duration;

use tokio::time::Instant;

/// A cached value plus the time it was stored and how long it stays fresh.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    value: V,
    ttl: Duration,
    created_at: Instant,
}

impl<V> CacheEntry<V> {
    /// Create an entry stamped with the current time.
    #[must_use]
    pub fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            ttl,
            created_at: Instant::now(),
        }
    }

    /// Whether the entry has outlived its TTL.
    ///
    /// An entry exactly `ttl` old is still fresh.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Whether the entry has outlived its TTL at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }

    /// Time left before expiry (zero once expired).
    #[must_use]
    pub fn remaining_ttl(&self) -> Duration {
        self.ttl.saturating_sub(self.created_at.elapsed())
    }

    /// Borrow the cached value.
    #[must_use]
    pub const fn value(&self) -> &V {
        &self.value
    }

    /// Configured TTL.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// When the entry was stored.
    #[must_use]
    pub const fn created_at(&self) -> Instant {
        self.created_at
    }
}
