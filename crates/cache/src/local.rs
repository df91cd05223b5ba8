//! In-process TTL cache backed by DashMap for lock-free concurrent access.
//! Injected where the engine needs short-lived read caching (experiment
//! configuration) or a bounded seen-set (event id de-duplication).

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Lock-free TTL cache with a capacity bound and explicit invalidation.
pub struct TtlCache<K: Eq + Hash, V: Clone> {
    store: Arc<DashMap<K, CacheEntry<V>>>,
    ttl: Duration,
    max_entries: usize,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            store: Arc::new(DashMap::with_capacity(max_entries.min(1024))),
            ttl,
            max_entries,
        }
    }

    /// Get a value, returns None if expired or missing.
    pub fn get(&self, key: &K) -> Option<V> {
        let entry = self.store.get(key)?;
        if entry.inserted_at.elapsed() > self.ttl {
            drop(entry);
            self.store.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    /// Insert or update a value.
    pub fn put(&self, key: K, value: V) {
        // Simple eviction: if over capacity, skip insert (background cleanup handles this)
        if self.store.len() >= self.max_entries && !self.store.contains_key(&key) {
            return;
        }
        self.store.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Insert only if the key is absent (or expired). Returns true when the
    /// insert happened, false when a live entry was already present.
    pub fn put_if_absent(&self, key: K, value: V) -> bool {
        let mut inserted = false;
        let mut entry = self.store.entry(key).or_insert_with(|| {
            inserted = true;
            CacheEntry {
                value: value.clone(),
                inserted_at: Instant::now(),
            }
        });
        if !inserted && entry.inserted_at.elapsed() > self.ttl {
            entry.value = value;
            entry.inserted_at = Instant::now();
            inserted = true;
        }
        inserted
    }

    /// Drop a key immediately, e.g. after the underlying record mutates.
    pub fn invalidate(&self, key: &K) {
        self.store.remove(key);
    }

    /// Remove expired entries. Call this periodically from a background task.
    pub fn evict_expired(&self) -> usize {
        let before = self.store.len();
        self.store
            .retain(|_, entry| entry.inserted_at.elapsed() <= self.ttl);
        before - self.store.len()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
