//! Workforce Registry
//!
//! Concurrent keyed store for live worker handles. The pool registers a
//! handle when it spawns a worker and evicts it when the worker reports
//! its own exit; counting and lookup happen concurrently from the facade.
//!
//! The registry carries no pool logic of its own: it is a thin wrapper
//! over a sharded concurrent map with the small surface the pool consumes
//! (add, remove, count, lookup, enumerate).
//!
//! # Example
//!
//! ```
//! use wf_registry::Registry;
//!
//! let registry: Registry<u64, &str> = Registry::new();
//! registry.add(1, "worker-1");
//! assert_eq!(registry.count(), 1);
//! assert_eq!(registry.get(&1), Some("worker-1"));
//! registry.remove(&1);
//! assert!(registry.is_empty());
//! ```

use std::hash::Hash;

use dashmap::DashMap;

/// Concurrent map of live entries keyed by identifier.
///
/// All operations are safe under concurrent add/remove/count/iterate from
/// multiple tasks. Enumeration order is unspecified.
pub struct Registry<K, V> {
    entries: DashMap<K, V>,
}

impl<K, V> Registry<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Insert an entry, replacing any previous value under the same key.
    pub fn add(&self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    /// Remove an entry, returning it if it was present. Idempotent: a
    /// second removal of the same key returns `None`.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, value)| value)
    }

    /// Look up an entry by key, cloning the stored value.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Number of live entries.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all stored values, in no particular order.
    pub fn get_all(&self) -> Vec<V> {
        self.entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

impl<K, V> Default for Registry<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
