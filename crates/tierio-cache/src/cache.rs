//! TTL + LRU cache with single-flight population

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tierio_common::{Error, Result};
use tracing::debug;

/// Individual cache entry with LRU tracking
struct CacheEntry {
    data: Bytes,
    expires_at: Instant,
    /// Logical-clock tick of the last access, for LRU ordering
    last_access: AtomicU64,
}

impl CacheEntry {
    fn new(data: Bytes, ttl: Duration, clock: u64) -> Self {
        Self {
            data,
            expires_at: Instant::now() + ttl,
            last_access: AtomicU64::new(clock),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    fn touch(&self, clock: u64) {
        self.last_access.store(clock, Ordering::Relaxed);
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub expirations: AtomicU64,
}

impl CacheStats {
    /// Hit ratio in [0.0, 1.0]
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }
}

/// Bounded TTL cache with per-key single-flight population
pub struct ReadThroughCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// Per-key population gates; an entry exists only while a population
    /// for that key is in flight
    flights: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    clock: AtomicU64,
    max_bytes: u64,
    max_entries: usize,
    stats: CacheStats,
}

impl ReadThroughCache {
    /// Create a cache with the given soft caps
    #[must_use]
    pub fn new(max_bytes: u64, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            flights: DashMap::new(),
            clock: AtomicU64::new(0),
            max_bytes,
            max_entries,
            stats: CacheStats::default(),
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Number of cached entries
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.read().len()
    }

    /// Total bytes held by cached values
    #[must_use]
    pub fn size(&self) -> u64 {
        self.entries
            .read()
            .values()
            .map(|e| e.data.len() as u64)
            .sum()
    }

    /// Look up an unexpired value
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(key) {
                if !entry.is_expired(now) {
                    entry.touch(self.tick());
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.data.clone());
                }
            } else {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }
        // Expired: drop it under the write lock
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(key) {
            if entry.is_expired(now) {
                entries.remove(key);
                self.stats.expirations.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert a value with the given TTL
    pub fn set(&self, key: &str, data: Bytes, ttl: Duration) -> Result<()> {
        if key.is_empty() {
            return Err(Error::invalid_argument("cache key must not be empty"));
        }
        if data.is_empty() {
            return Err(Error::invalid_argument("cache value must not be empty"));
        }
        let clock = self.tick();
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), CacheEntry::new(data, ttl, clock));
        self.enforce_caps(&mut entries);
        Ok(())
    }

    /// Remove a value; returns whether it was present
    pub fn remove(&self, key: &str) -> Result<bool> {
        if key.is_empty() {
            return Err(Error::invalid_argument("cache key must not be empty"));
        }
        Ok(self.entries.write().remove(key).is_some())
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Return the cached value for `key`, or compute, store, and return it
    ///
    /// Exactly one computation happens per key per population event: losers
    /// of the per-key gate re-check the map and observe the winner's value.
    /// A failed computation stores nothing and propagates the error.
    pub async fn get_or_set<F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> Result<Bytes>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes>>,
    {
        if key.is_empty() {
            return Err(Error::invalid_argument("cache key must not be empty"));
        }

        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let gate = self
            .flights
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = gate.lock().await;

        // Re-check after winning the gate: the previous holder may have
        // populated the entry already.
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        debug!(key, "cache population");
        let result = compute().await;
        self.flights.remove(key);
        match result {
            Ok(value) => {
                self.set(key, value.clone(), ttl)?;
                Ok(value)
            }
            Err(e) => Err(e),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Evict LRU entries while over the byte or entry-count cap
    fn enforce_caps(&self, entries: &mut HashMap<String, CacheEntry>) {
        let now = Instant::now();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            entries.remove(&key);
            self.stats.expirations.fetch_add(1, Ordering::Relaxed);
        }

        loop {
            let total: u64 = entries.values().map(|e| e.data.len() as u64).sum();
            if entries.len() <= self.max_entries && total <= self.max_bytes {
                break;
            }
            let Some(lru) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_access.load(Ordering::Relaxed))
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            entries.remove(&lru);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}
