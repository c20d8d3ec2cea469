//! In-memory translation cache with TTL and a size bound.
//! Key: blake3 hash of the raw, unprocessed source text.
//! Eviction follows insertion order: lookups never refresh recency.

use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

pub type CacheKey = [u8; 32];

struct CacheEntry {
    translated_text: String,
    inserted_at: Instant,
}

pub struct TranslationCache {
    inner: Mutex<LruCache<CacheKey, CacheEntry>>,
    ttl: Duration,
}

impl TranslationCache {
    /// A zero `max_size` is treated as 1.
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(cap)),
            ttl,
        }
    }

    /// Compute the cache key from the raw source text.
    pub fn compute_key(raw_text: &str) -> CacheKey {
        *blake3::hash(raw_text.as_bytes()).as_bytes()
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.inserted_at) > self.ttl
    }

    /// Look up a cached translation. Returns None if absent or expired.
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        let mut cache = self.inner.lock();
        let now = Instant::now();
        let expired = match cache.peek(key) {
            Some(entry) if !self.is_expired(entry, now) => {
                return Some(entry.translated_text.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            cache.pop(key);
        }
        None
    }

    /// Insert a translation, evicting the oldest insertion when full.
    pub fn insert(&self, key: CacheKey, translated_text: String) {
        let mut cache = self.inner.lock();
        let evicted = cache.push(
            key,
            CacheEntry {
                translated_text,
                inserted_at: Instant::now(),
            },
        );
        if let Some((evicted_key, _)) = evicted {
            if evicted_key != key {
                debug!(size = cache.len(), "cache full, evicted oldest entry");
            }
        }
    }

    /// Remove every expired entry under a single lock acquisition.
    /// Returns the number of entries removed.
    pub fn sweep_expired(&self) -> usize {
        let mut cache = self.inner.lock();
        let now = Instant::now();
        let stale: Vec<CacheKey> = cache
            .iter()
            .filter(|(_, entry)| self.is_expired(entry, now))
            .map(|(key, _)| *key)
            .collect();
        for key in &stale {
            cache.pop(key);
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
