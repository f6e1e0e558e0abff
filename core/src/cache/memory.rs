//! In-memory LRU cache for compressed renders.

use std::hash::Hash;
use std::sync::Arc;

use hashlink::LruCache;

use crate::codec::CompressedRender;
use crate::render::RenderKey;
use crate::types::CacheBudget;

/// Byte cost charged against a cache budget.
pub trait CacheCost {
    fn cost(&self) -> usize;
}

impl CacheCost for CompressedRender {
    fn cost(&self) -> usize {
        CompressedRender::cost(self)
    }
}

impl<T: CacheCost> CacheCost for Arc<T> {
    fn cost(&self) -> usize {
        (**self).cost()
    }
}

/// Cache of compressed renders keyed by normalized render key.
pub type RenderCache = MemoryCache<RenderKey, Arc<CompressedRender>>;

/// LRU that evicts based on a total byte budget rather than an entry count.
#[derive(Debug)]
pub struct MemoryCache<K: Hash + Eq, V> {
    entries: LruCache<K, V>,
    budget: CacheBudget,
    bytes_used: usize,
    evictions: u64,
}

impl<K: Hash + Eq, V: CacheCost> MemoryCache<K, V> {
    /// Construct a cache with the provided memory budget.
    pub fn new(budget: CacheBudget) -> Self {
        Self { entries: LruCache::new_unbounded(), budget, bytes_used: 0, evictions: 0 }
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total memory consumption tracked by the cache.
    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    pub fn capacity(&self) -> usize {
        self.budget.bytes_max
    }

    /// Entries dropped to stay within budget since construction.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Retrieve an entry, refreshing its recency ordering if present.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Presence check that leaves recency untouched.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.peek(key).is_some()
    }

    /// Mark an entry as most recently used. Returns whether it was present.
    pub fn touch(&mut self, key: &K) -> bool {
        self.entries.get(key).is_some()
    }

    /// Insert or replace an entry, then evict least recently used entries until the budget holds.
    ///
    /// An entry costing more than the whole budget replaces any previous value for its key and
    /// is dropped straight away; other entries are left alone.
    pub fn put(&mut self, key: K, value: V) {
        self.remove(&key);

        let cost = value.cost();
        if cost > self.budget.bytes_max {
            self.evictions += 1;
            return;
        }

        self.bytes_used += cost;
        self.entries.insert(key, value);
        self.evict_if_needed();
    }

    /// Remove an entry from the cache if present.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let removed = self.entries.remove(key);
        if let Some(ref entry) = removed {
            self.bytes_used = self.bytes_used.saturating_sub(entry.cost());
        }
        removed
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(key, _)| key)
    }

    fn evict_if_needed(&mut self) {
        while self.bytes_used > self.budget.bytes_max {
            if let Some((_key, oldest)) = self.entries.remove_lru() {
                self.bytes_used = self.bytes_used.saturating_sub(oldest.cost());
                self.evictions += 1;
            } else {
                break;
            }
        }
    }
}
