//! Thread-safe LRU cache of decoded images, bounded by a byte budget.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::decode::ImageHandle;

/// Cache statistics.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size_bytes: usize,
    pub num_entries: usize,
}

/// Thread-safe LRU image cache.
///
/// Uses DashMap for concurrent access by key and a separate mutex-protected
/// LRU list for eviction ordering. Eviction is least-recently-used: `get`
/// refreshes an entry's recency, inserts pop from the front of the order
/// until the newcomer fits the byte budget. Evicted handles are released
/// immediately; the pixel buffer is freed once the last caller drops theirs.
pub struct MemoryCache {
    entries: DashMap<String, ImageHandle>,
    lru_order: Mutex<VecDeque<String>>,
    max_size_bytes: usize,
    current_size: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryCache {
    /// Create a cache with the given byte budget.
    pub fn new(max_size_bytes: usize) -> Self {
        Self {
            entries: DashMap::new(),
            lru_order: Mutex::new(VecDeque::new()),
            max_size_bytes,
            current_size: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get an entry, refreshing its LRU position on hit.
    pub fn get(&self, key: &str) -> Option<ImageHandle> {
        if let Some(entry) = self.entries.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);

            let mut lru = self.lru_order.lock();
            if let Some(pos) = lru.iter().position(|k| k == key) {
                lru.remove(pos);
                lru.push_back(key.to_string());
            }

            Some(entry.value().clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Insert an entry, evicting least-recently-used entries as needed to
    /// stay within the byte budget.
    pub fn put(&self, key: &str, image: ImageHandle) {
        let entry_size = image.size_bytes();

        self.evict_if_needed(entry_size);

        // Another worker may have decoded the same key concurrently
        if self.entries.contains_key(key) {
            return;
        }

        self.entries.insert(key.to_string(), image);
        self.current_size.fetch_add(entry_size, Ordering::Relaxed);

        let mut lru = self.lru_order.lock();
        lru.push_back(key.to_string());
    }

    fn evict_if_needed(&self, incoming_size: usize) {
        let target_size = self.max_size_bytes.saturating_sub(incoming_size);

        while self.current_size.load(Ordering::Relaxed) > target_size {
            let key_to_evict = {
                let mut lru = self.lru_order.lock();
                lru.pop_front()
            };

            if let Some(key) = key_to_evict {
                if let Some((_, image)) = self.entries.remove(&key) {
                    self.current_size
                        .fetch_sub(image.size_bytes(), Ordering::Relaxed);
                }
            } else {
                break;
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Drop every entry. Stats are kept for diagnostics.
    pub fn clear(&self) {
        self.entries.clear();
        self.lru_order.lock().clear();
        self.current_size.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size_bytes: self.current_size.load(Ordering::Relaxed),
            num_entries: self.entries.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_image;

    #[test]
    fn test_insert_and_get() {
        let cache = MemoryCache::new(10 * 1024 * 1024);
        cache.put("a", test_image(10, 10));

        let entry = cache.get("a");
        assert!(entry.is_some());
        assert_eq!(entry.unwrap().width(), 10);
    }

    #[test]
    fn test_miss_counts() {
        let cache = MemoryCache::new(1024);
        assert!(cache.get("missing").is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_hit_counts() {
        let cache = MemoryCache::new(10 * 1024 * 1024);
        cache.put("a", test_image(4, 4));
        cache.get("a");
        cache.get("a");
        assert_eq!(cache.stats().hits, 2);
    }

    #[test]
    fn test_eviction_on_budget() {
        // Each 10x10 RGBA image is 400 bytes; budget fits two
        let cache = MemoryCache::new(900);
        cache.put("a", test_image(10, 10));
        cache.put("b", test_image(10, 10));
        cache.put("c", test_image(10, 10));

        assert!(!cache.contains("a"));
        assert!(cache.contains("c"));
        assert!(cache.stats().size_bytes <= 900);
    }

    #[test]
    fn test_lru_order_respects_access() {
        let cache = MemoryCache::new(900);
        cache.put("a", test_image(10, 10));
        cache.put("b", test_image(10, 10));

        // Refresh "a" so "b" is the eviction candidate
        cache.get("a");
        cache.put("c", test_image(10, 10));

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
    }

    #[test]
    fn test_clear() {
        let cache = MemoryCache::new(10 * 1024 * 1024);
        cache.put("a", test_image(4, 4));
        cache.put("b", test_image(4, 4));

        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.stats().size_bytes, 0);
    }

    #[test]
    fn test_duplicate_put_keeps_size_consistent() {
        let cache = MemoryCache::new(10 * 1024 * 1024);
        cache.put("a", test_image(10, 10));
        let size = cache.stats().size_bytes;
        cache.put("a", test_image(10, 10));
        assert_eq!(cache.stats().size_bytes, size);
        assert_eq!(cache.len(), 1);
    }
}
