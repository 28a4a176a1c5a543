//! Output cache for built resource set responses
//!
//! Entries expire after a sliding TTL: every hit pushes the expiry out by
//! the entry's own TTL again. When the cache is full the least recently
//! used entries are evicted first. A miss, an expired entry and a key that
//! was never added all look the same to callers.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Key/value store for built responses
#[async_trait]
pub trait OutputCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Bytes>;

    /// Store a value that expires `ttl` after its last access
    async fn add(&self, key: &str, value: Bytes, ttl: Duration);

    /// Remove every entry whose key starts with `prefix`, returning how many went
    async fn remove_prefix(&self, prefix: &str) -> usize;
}

struct CacheEntry {
    data: Bytes,
    ttl: Duration,
    expires_at: Instant,
    last_accessed: Instant,
}

/// Output cache statistics for monitoring
#[derive(Debug, Clone, Serialize)]
pub struct OutputCacheStats {
    pub total_entries: usize,
    pub total_bytes: usize,
    pub max_bytes: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Entries plus their total payload size, kept under one lock
#[derive(Default)]
struct Storage {
    entries: HashMap<String, CacheEntry>,
    size_bytes: usize,
}

impl Storage {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let old = self.entries.remove(key)?;
        self.size_bytes = self.size_bytes.saturating_sub(old.data.len());
        Some(old)
    }

    fn retain(&mut self, mut keep: impl FnMut(&str, &CacheEntry) -> bool) -> usize {
        let before = self.entries.len();
        let mut removed_bytes = 0;
        self.entries.retain(|key, entry| {
            if keep(key.as_str(), &*entry) {
                true
            } else {
                removed_bytes += entry.data.len();
                false
            }
        });
        self.size_bytes = self.size_bytes.saturating_sub(removed_bytes);
        before - self.entries.len()
    }

    /// Evict least recently used entries until `needed_bytes` are freed
    fn evict_lru(&mut self, needed_bytes: usize) {
        let mut candidates: Vec<_> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.last_accessed))
            .collect();
        candidates.sort_by_key(|(_, last_accessed)| *last_accessed);

        let mut freed_bytes = 0;
        let mut removed = 0;
        for (key, _) in candidates {
            if freed_bytes >= needed_bytes {
                break;
            }
            if let Some(old) = self.remove(&key) {
                freed_bytes += old.data.len();
                removed += 1;
            }
        }
        debug!(
            "LRU eviction: freed {} bytes by removing {} entries",
            freed_bytes, removed
        );
    }
}

/// In-process output cache
pub struct MemoryOutputCache {
    storage: RwLock<Storage>,
    max_size_bytes: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryOutputCache {
    /// Create a cache bounded to `max_size_bytes` of payload
    pub fn new(max_size_bytes: usize) -> Self {
        MemoryOutputCache {
            storage: RwLock::new(Storage::default()),
            max_size_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get_stats(&self) -> OutputCacheStats {
        let storage = self.storage.read();
        OutputCacheStats {
            total_entries: storage.entries.len(),
            total_bytes: storage.size_bytes,
            max_bytes: self.max_size_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl OutputCache for MemoryOutputCache {
    async fn get(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        let mut storage = self.storage.write();
        let (hit, expired) = match storage.entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.expires_at = now + entry.ttl;
                entry.last_accessed = now;
                (Some(entry.data.clone()), false)
            }
            Some(_) => (None, true),
            None => (None, false),
        };
        if expired {
            storage.remove(key);
        }
        drop(storage);

        match &hit {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        hit
    }

    async fn add(&self, key: &str, value: Bytes, ttl: Duration) {
        let size = value.len();
        if size > self.max_size_bytes {
            debug!(
                "Not caching key={}: {} bytes exceeds cache size {}",
                key, size, self.max_size_bytes
            );
            return;
        }

        let now = Instant::now();
        let mut storage = self.storage.write();
        storage.retain(|_, entry| entry.expires_at > now);

        // Replacing an entry frees its old bytes first
        storage.remove(key);

        if storage.size_bytes + size > self.max_size_bytes {
            let needed = storage.size_bytes + size - self.max_size_bytes;
            storage.evict_lru(needed);
        }

        storage.entries.insert(
            key.to_string(),
            CacheEntry {
                data: value,
                ttl,
                expires_at: now + ttl,
                last_accessed: now,
            },
        );
        storage.size_bytes += size;
        drop(storage);
        debug!("Cached output key={}, size={}, ttl={:?}", key, size, ttl);
    }

    async fn remove_prefix(&self, prefix: &str) -> usize {
        self.storage
            .write()
            .retain(|key, _| !key.starts_with(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_add_and_get() {
        let cache = MemoryOutputCache::new(1024);
        cache.add("k", Bytes::from_static(b"body"), Duration::from_secs(60)).await;

        assert_eq!(cache.get("k").await, Some(Bytes::from_static(b"body")));
        assert_eq!(cache.get("missing").await, None);

        let stats = cache.get_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_bytes, 4);
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let cache = MemoryOutputCache::new(1024);
        cache.add("k", Bytes::from_static(b"x"), Duration::from_millis(20)).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.get_stats().total_entries, 0);
    }

    #[tokio::test]
    async fn test_sliding_expiration() {
        let cache = MemoryOutputCache::new(1024);
        cache.add("k", Bytes::from_static(b"x"), Duration::from_millis(150)).await;
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(60)).await;
            assert!(cache.get("k").await.is_some());
        }
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = MemoryOutputCache::new(10);
        let ttl = Duration::from_secs(60);
        cache.add("a", Bytes::from_static(b"aaaa"), ttl).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.add("b", Bytes::from_static(b"bbbb"), ttl).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(cache.get("a").await.is_some());
        cache.add("c", Bytes::from_static(b"cccc"), ttl).await;

        assert!(cache.get("a").await.is_some());
        assert!(cache.get("b").await.is_none());
        assert!(cache.get("c").await.is_some());
        assert!(cache.get_stats().total_bytes <= 10);
    }

    #[tokio::test]
    async fn test_oversized_value_not_cached() {
        let cache = MemoryOutputCache::new(2);
        cache.add("k", Bytes::from_static(b"toolong"), Duration::from_secs(1)).await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_of_one_key_keep_size_exact() {
        let cache = Arc::new(MemoryOutputCache::new(64 * 1024));
        let ttl = Duration::from_secs(60);

        for _ in 0..200 {
            let mut handles = Vec::new();
            for _ in 0..8 {
                let cache = cache.clone();
                handles.push(tokio::spawn(async move {
                    cache.add("same/key", Bytes::from(vec![0u8; 1000]), ttl).await;
                }));
            }
            for handle in handles {
                handle.await.unwrap();
            }

            let stats = cache.get_stats();
            assert_eq!(stats.total_entries, 1);
            assert_eq!(stats.total_bytes, 1000);
        }
    }

    #[tokio::test]
    async fn test_replacing_entry_updates_size() {
        let cache = MemoryOutputCache::new(1024);
        let ttl = Duration::from_secs(60);
        cache.add("k", Bytes::from_static(b"long body"), ttl).await;
        cache.add("k", Bytes::from_static(b"short"), ttl).await;

        assert_eq!(cache.get_stats().total_bytes, 5);
        assert_eq!(cache.get("k").await, Some(Bytes::from_static(b"short")));
    }

    #[tokio::test]
    async fn test_remove_prefix() {
        let cache = MemoryOutputCache::new(1024);
        let ttl = Duration::from_secs(60);
        cache.add("p/site/1/gzip", Bytes::from_static(b"1"), ttl).await;
        cache.add("p/site/1/gzip/@etag", Bytes::from_static(b"2"), ttl).await;
        cache.add("p/other/1/gzip", Bytes::from_static(b"3"), ttl).await;

        assert_eq!(cache.remove_prefix("p/site/").await, 2);
        assert!(cache.get("p/other/1/gzip").await.is_some());
        assert_eq!(cache.get_stats().total_bytes, 1);
    }
}
