//! Recency ordering for LRU eviction.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// Tracks keys from least to most recently used.
///
/// Every touch stamps the key with a fresh logical tick, so the smallest
/// tick is always the least recently used key.
#[derive(Debug)]
pub struct LruTracker<K> {
    clock: u64,
    by_tick: BTreeMap<u64, K>,
    tick_of: HashMap<K, u64>,
}

impl<K: Clone + Eq + Hash> LruTracker<K> {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: 0,
            by_tick: BTreeMap::new(),
            tick_of: HashMap::new(),
        }
    }

    /// Mark `key` as most recently used, inserting it if absent.
    pub fn touch(&mut self, key: &K) {
        if let Some(old) = self.tick_of.get(key) {
            self.by_tick.remove(old);
        }
        self.clock += 1;
        self.by_tick.insert(self.clock, key.clone());
        self.tick_of.insert(key.clone(), self.clock);
    }

    /// Stop tracking `key`. Returns whether it was tracked.
    pub fn remove(&mut self, key: &K) -> bool {
        match self.tick_of.remove(key) {
            Some(tick) => {
                self.by_tick.remove(&tick);
                true
            }
            None => false,
        }
    }

    /// Remove and return the least recently used key.
    pub fn pop_least_recent(&mut self) -> Option<K> {
        let (_, key) = self.by_tick.pop_first()?;
        self.tick_of.remove(&key);
        Some(key)
    }

    /// Peek at the least recently used key.
    #[must_use]
    pub fn least_recent(&self) -> Option<&K> {
        self.by_tick.values().next()
    }

    /// Keys from least to most recently used.
    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.by_tick.values()
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tick_of.len()
    }

    /// Whether no keys are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tick_of.is_empty()
    }

    /// Forget all keys.
    pub fn clear(&mut self) {
        self.by_tick.clear();
        self.tick_of.clear();
    }
}

impl<K: Clone + Eq + Hash> Default for LruTracker<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_returns_oldest_first() {
        let mut lru = LruTracker::new();
        lru.touch(&"a");
        lru.touch(&"b");
        lru.touch(&"c");

        assert_eq!(lru.pop_least_recent(), Some("a"));
        assert_eq!(lru.pop_least_recent(), Some("b"));
        assert_eq!(lru.len(), 1);
    }

    #[test]
    fn test_touch_refreshes_recency() {
        let mut lru = LruTracker::new();
        lru.touch(&"a");
        lru.touch(&"b");
        lru.touch(&"a");

        assert_eq!(lru.least_recent(), Some(&"b"));
        assert_eq!(lru.iter().copied().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(lru.len(), 2);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut lru = LruTracker::new();
        lru.touch(&1);
        lru.touch(&2);

        assert!(lru.remove(&1));
        assert!(!lru.remove(&1));
        assert_eq!(lru.least_recent(), Some(&2));

        lru.clear();
        assert!(lru.is_empty());
        assert_eq!(lru.pop_least_recent(), None);
    }
}
