//! Memory-bounded LRU caches for source files and decoded chunks.

use lru::LruCache;
use serde::Serialize;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Approximate heap size of a cached value.
pub trait CacheWeight {
    fn weight(&self) -> usize;
}

impl<T: CacheWeight + ?Sized> CacheWeight for Arc<T> {
    fn weight(&self) -> usize {
        (**self).weight()
    }
}

/// Cache key for chunks: (file path hash, chunk index).
pub type ChunkKey = (u64, u32);

/// One decoded TIFF chunk, band-separated, no-data as `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkData {
    /// Row stride of each band in pixels.
    pub width: usize,
    pub height: usize,
    pub bands: Vec<Vec<f32>>,
}

impl ChunkData {
    pub fn value(&self, band: usize, col: usize, row: usize) -> f32 {
        self.bands
            .get(band)
            .and_then(|b| b.get(row * self.width + col))
            .copied()
            .unwrap_or(f32::NAN)
    }
}

impl CacheWeight for ChunkData {
    fn weight(&self) -> usize {
        self.bands.iter().map(|b| b.len()).sum::<usize>() * std::mem::size_of::<f32>()
    }
}

/// Decoded chunks shared across requests.
pub type ChunkCache = SizedLruCache<ChunkKey, Arc<ChunkData>>;

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub memory_bytes: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Cache hit rate (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// LRU cache with memory-bounded eviction.
///
/// A memory limit of 0 disables caching: inserts are dropped.
pub struct SizedLruCache<K: Hash + Eq, V: CacheWeight + Clone> {
    cache: LruCache<K, V>,
    memory_limit: usize,
    current_memory: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K: Hash + Eq, V: CacheWeight + Clone> SizedLruCache<K, V> {
    /// Create a cache with the given memory limit in bytes.
    pub fn new(memory_limit: usize) -> Self {
        Self {
            cache: LruCache::unbounded(),
            memory_limit,
            current_memory: 0,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a value, updating LRU order and hit/miss counters.
    pub fn get(&mut self, key: &K) -> Option<V> {
        if let Some(value) = self.cache.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(value.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.cache.contains(key)
    }

    /// Insert a value, evicting least recently used entries to make room.
    /// Values larger than the whole budget are not cached.
    pub fn insert(&mut self, key: K, value: V) {
        let size = value.weight();
        if size > self.memory_limit {
            return;
        }

        if let Some(old) = self.cache.pop(&key) {
            self.current_memory = self.current_memory.saturating_sub(old.weight());
        }

        while self.current_memory + size > self.memory_limit && !self.cache.is_empty() {
            if let Some((_, evicted)) = self.cache.pop_lru() {
                self.current_memory = self.current_memory.saturating_sub(evicted.weight());
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.cache.put(key, value);
        self.current_memory += size;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.len(),
            memory_bytes: self.current_memory as u64,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.current_memory = 0;
    }

    pub fn memory_usage(&self) -> usize {
        self.current_memory
    }

    pub fn memory_limit(&self) -> usize {
        self.memory_limit
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Hash of a storage path, used in chunk keys to tell files apart.
pub fn hash_path(path: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::Hasher;

    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(value: f32, len: usize) -> Arc<ChunkData> {
        Arc::new(ChunkData {
            width: len,
            height: 1,
            bands: vec![vec![value; len]],
        })
    }

    #[test]
    fn test_cache_insert_and_get() {
        let mut cache = ChunkCache::new(1024 * 1024);
        let key = (123, 0);
        assert!(cache.get(&key).is_none());
        cache.insert(key, chunk(1.0, 4));
        assert_eq!(cache.get(&key).unwrap().value(0, 2, 0), 1.0);
        assert_eq!(cache.memory_usage(), 16);
    }

    #[test]
    fn test_cache_lru_eviction() {
        // 64 bytes = 16 f32s
        let mut cache = ChunkCache::new(64);
        for i in 0..10 {
            cache.insert((0, i), chunk(i as f32, 4));
        }
        assert!(cache.get(&(0, 0)).is_none());
        assert!(cache.get(&(0, 9)).is_some());
        assert!(cache.stats().evictions > 0);
        assert!(cache.memory_usage() <= 64);
    }

    #[test]
    fn test_zero_limit_disables_cache() {
        let mut cache = ChunkCache::new(0);
        cache.insert((0, 0), chunk(1.0, 4));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_reinsert_does_not_double_count() {
        let mut cache = ChunkCache::new(1024);
        cache.insert((0, 0), chunk(1.0, 4));
        cache.insert((0, 0), chunk(2.0, 4));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.memory_usage(), 16);
    }

    #[test]
    fn test_cache_stats() {
        let mut cache = ChunkCache::new(1024 * 1024);
        cache.insert((0, 0), chunk(1.0, 4));
        cache.get(&(0, 0));
        cache.get(&(0, 1));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.memory_usage(), 0);
    }

    #[test]
    fn test_hash_path() {
        assert_eq!(hash_path("datasets/calc.tif"), hash_path("datasets/calc.tif"));
        assert_ne!(hash_path("datasets/calc.tif"), hash_path("datasets/distances.tif"));
    }
}
