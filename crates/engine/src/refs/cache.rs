use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::RefOuts;

/// Store for resolved edge lists.
///
/// The resolver only reads and writes through this trait; lifetime and
/// eviction belong to the caller. `get` must hand back the same `Arc` that
/// was `put`.
pub trait RefCache: Send + Sync {
    fn get(&self, key: &str) -> Option<RefOuts>;
    fn put(&self, key: &str, refs: RefOuts);
}

/// [`RefCache`] backed by a hash map.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<FxHashMap<String, RefOuts>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop one entry, eg. after the cell's formula changed.
    pub fn remove(&self, key: &str) -> Option<RefOuts> {
        self.entries.write().remove(key)
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl RefCache for MemoryCache {
    fn get(&self, key: &str) -> Option<RefOuts> {
        self.entries.read().get(key).cloned()
    }

    fn put(&self, key: &str, refs: RefOuts) {
        self.entries.write().insert(key.to_string(), refs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_get_returns_same_instance() {
        let cache = MemoryCache::new();
        let refs: RefOuts = Arc::new(Vec::new());
        cache.put("A1", refs.clone());

        let hit = cache.get("A1").unwrap();
        assert!(Arc::ptr_eq(&hit, &refs));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = MemoryCache::new();
        cache.put("A1", Arc::new(Vec::new()));
        cache.put("A2", Arc::new(Vec::new()));
        assert!(cache.remove("A1").is_some());
        assert!(cache.get("A1").is_none());
        cache.clear();
        assert!(cache.is_empty());
    }
}
