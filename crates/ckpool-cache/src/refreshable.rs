//! Generic refreshable-cache pattern: a read-write-locked map that a single
//! background task rebuilds from an external source of truth. The new map
//! is always built outside the lock and swapped in under a brief write
//! lock, so hot-path readers never block on a slow Redis round trip.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

pub struct RefreshableCache<V> {
    map: RwLock<HashMap<String, V>>,
}

impl<V: Clone> Default for RefreshableCache<V> {
    fn default() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }
}

impl<V: Clone> RefreshableCache<V> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.map.read().get(key).cloned()
    }

    pub fn insert(&self, key: String, value: V) {
        self.map.write().insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Replaces the entire map. The old map is dropped after the write lock
    /// is released (the caller never observes a torn intermediate state).
    pub fn swap(&self, new_map: HashMap<String, V>) {
        let old = {
            let mut guard = self.map.write();
            std::mem::replace(&mut *guard, new_map)
        };
        drop(old);
    }

    pub fn snapshot(&self) -> HashMap<String, V> {
        self.map.read().clone()
    }
}
