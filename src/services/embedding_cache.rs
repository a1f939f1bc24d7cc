//! In-memory embedding cache.
//!
//! Bounded LRU with per-entry TTL and pinning. When full, the least recently
//! accessed expired entry is evicted first, then the least recently accessed
//! unpinned entry. All operations are synchronous and never hold the lock
//! across an await point.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;

use crate::domain::models::{CacheKey, EmbeddingVector, MAX_CACHE_TTL_SECS};

/// Lifetimes above this are clamped.
const MAX_TTL: Duration = Duration::from_secs(MAX_CACHE_TTL_SECS);

#[derive(Debug, Clone)]
struct CacheEntry {
    value: EmbeddingVector,
    inserted_at: Instant,
    expires_at: Instant,
    last_access_at: Instant,
    /// Position in the recency index.
    tick: u64,
    pinned: bool,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<CacheKey, CacheEntry>,
    /// Access tick → key, oldest first.
    recency: BTreeMap<u64, CacheKey>,
    next_tick: u64,
    stats: CacheStats,
}

impl CacheInner {
    fn touch(&mut self, key: &CacheKey, now: Instant) {
        let tick = self.next_tick;
        self.next_tick += 1;
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.tick);
            entry.tick = tick;
            entry.last_access_at = now;
            self.recency.insert(tick, key.clone());
        }
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.tick);
        Some(entry)
    }

    /// Evict one entry to make room. Returns false when every entry is pinned
    /// and live.
    fn evict_one(&mut self, now: Instant) -> bool {
        let expired = self
            .recency
            .values()
            .find(|key| self.entries.get(*key).is_some_and(|e| e.is_expired(now)))
            .cloned();
        if let Some(key) = expired {
            self.remove(&key);
            self.stats.expirations += 1;
            return true;
        }

        let victim = self
            .recency
            .values()
            .find(|key| self.entries.get(*key).is_some_and(|e| !e.pinned))
            .cloned();
        if let Some(key) = victim {
            self.remove(&key);
            self.stats.evictions += 1;
            return true;
        }
        false
    }
}

/// Bounded, TTL-aware LRU cache of embedding vectors.
#[derive(Debug)]
pub struct EmbeddingCache {
    inner: Mutex<CacheInner>,
    max_entries: usize,
    default_ttl: Duration,
}

impl EmbeddingCache {
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            max_entries,
            default_ttl,
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Return the cached vector if present and not expired.
    pub fn get(&self, key: &CacheKey) -> Option<EmbeddingVector> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        match inner.entries.get(key).map(|entry| entry.is_expired(now)) {
            None => {
                inner.stats.misses += 1;
                None
            }
            Some(true) => {
                inner.remove(key);
                inner.stats.expirations += 1;
                inner.stats.misses += 1;
                None
            }
            Some(false) => {
                inner.touch(key, now);
                inner.stats.hits += 1;
                inner.entries.get(key).map(|e| e.value.clone())
            }
        }
    }

    /// Insert or replace an entry with the given lifetime, clamped to one year.
    ///
    /// Returns false if the cache is full of pinned entries and nothing could
    /// be evicted; the value is then not cached.
    pub fn put(&self, key: CacheKey, value: EmbeddingVector, ttl: Duration) -> bool {
        let now = Instant::now();
        let ttl = ttl.min(MAX_TTL);
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.value = value;
            entry.inserted_at = now;
            entry.expires_at = now + ttl;
            inner.touch(&key, now);
            return true;
        }

        if inner.entries.len() >= self.max_entries && !inner.evict_one(now) {
            tracing::debug!(key = %key, "Embedding cache full of pinned entries, not caching");
            return false;
        }

        let tick = inner.next_tick;
        inner.next_tick += 1;
        inner.recency.insert(tick, key.clone());
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
                expires_at: now + ttl,
                last_access_at: now,
                tick,
                pinned: false,
            },
        );
        true
    }

    /// Insert with the default lifetime.
    pub fn put_default(&self, key: CacheKey, value: EmbeddingVector) -> bool {
        self.put(key, value, self.default_ttl)
    }

    /// Protect an entry from capacity eviction. Returns false if absent.
    pub fn pin(&self, key: &CacheKey) -> bool {
        self.set_pinned(key, true)
    }

    pub fn unpin(&self, key: &CacheKey) -> bool {
        self.set_pinned(key, false)
    }

    fn set_pinned(&self, key: &CacheKey, pinned: bool) -> bool {
        let mut inner = self.inner.lock();
        match inner.entries.get_mut(key) {
            Some(entry) => {
                entry.pinned = pinned;
                true
            }
            None => false,
        }
    }

    /// Remove an entry. Returns true if it existed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    /// Drop every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let expired: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        inner.stats.expirations += expired.len() as u64;
        expired.len()
    }

    /// Age of a live entry since it was last written.
    pub fn age(&self, key: &CacheKey) -> Option<Duration> {
        let inner = self.inner.lock();
        inner.entries.get(key).map(|e| e.inserted_at.elapsed())
    }

    /// Time since a live entry was last read or written.
    pub fn idle_time(&self, key: &CacheKey) -> Option<Duration> {
        let inner = self.inner.lock();
        inner.entries.get(key).map(|e| e.last_access_at.elapsed())
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        let now = Instant::now();
        let inner = self.inner.lock();
        inner.entries.get(key).is_some_and(|e| !e.is_expired(now))
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            ..inner.stats
        }
    }
}
