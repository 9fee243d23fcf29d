use crate::cache::{BlobStore, CacheEntry, CacheKey, CacheSource, CachedResponse};
use crate::clock::{Clock, SystemClock};
use crate::http::EdgeResponse;
use crate::strategy::CacheStrategy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Result of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// Fresh entry found.
    Hit(CachedResponse),
    /// Nothing usable under the key (absent, or the backend failed).
    Miss,
    /// An entry existed but was at or past its TTL; it has been purged.
    Stale { age_secs: u64 },
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }

    /// The cached response on a hit.
    pub fn into_hit(self) -> Option<CachedResponse> {
        match self {
            CacheLookup::Hit(cached) => Some(cached),
            _ => None,
        }
    }
}

/// Snapshot of coordinator counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    /// Stale entries purged on lookup.
    pub evictions: u64,
    /// Backend failures that were absorbed.
    pub errors: u64,
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
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    evictions: AtomicU64,
    errors: AtomicU64,
}

impl AtomicStats {
    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Reads and writes cached responses, and decides whether a stored one is still fresh.
///
/// Every backend failure degrades: a failed read is a miss, a failed write or delete is
/// dropped after a warning. Nothing here can fail a request.
#[derive(Debug)]
pub struct CacheCoordinator {
    backend: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    stats: AtomicStats,
    last_stamp: AtomicU64,
}

impl CacheCoordinator {
    /// Coordinator over `backend` using the wall clock.
    pub fn new<B: BlobStore + 'static>(backend: B) -> Self {
        Self::from_arc(Arc::new(backend))
    }

    /// Coordinator over a shared backend handle.
    pub fn from_arc(backend: Arc<dyn BlobStore>) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
            stats: AtomicStats::default(),
            last_stamp: AtomicU64::new(0),
        }
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Share one clock handle with other components.
    pub fn with_shared_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Look up `key` and judge freshness against `strategy`.
    ///
    /// An entry whose age is at or beyond `strategy.ttl_seconds()` is a miss and is deleted
    /// from the backend; a failed delete is logged and otherwise ignored.
    pub async fn lookup(&self, key: &CacheKey, strategy: &CacheStrategy) -> CacheLookup {
        let entry = match self.backend.match_entry(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(target: "cachegate::cache", key = %key, "cache miss");
                return CacheLookup::Miss;
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    target: "cachegate::cache",
                    key = %key,
                    backend = self.backend.name(),
                    error = %e,
                    "cache lookup failed; treating as miss"
                );
                return CacheLookup::Miss;
            }
        };

        let age_millis = entry.age_millis(self.clock.now_millis());
        let age_secs = age_millis / 1_000;
        if !strategy.is_fresh(age_millis) {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(target: "cachegate::cache", key = %key, age_secs, "stale entry purged");
            self.purge_stale(key, entry.cached_at_millis).await;
            return CacheLookup::Stale { age_secs };
        }

        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(target: "cachegate::cache", key = %key, age_secs, "cache hit");
        CacheLookup::Hit(CachedResponse { entry, age_secs, source: CacheSource::Hit })
    }

    /// Stamp `response` for storage without writing it.
    ///
    /// Stamps never go backwards within one coordinator, even if the clock does, so the
    /// creation time of a key only grows across overwrites.
    pub fn stamp(&self, response: EdgeResponse, strategy: &CacheStrategy) -> CacheEntry {
        let now = self.clock.now_millis();
        let previous = self.last_stamp.fetch_max(now, Ordering::AcqRel);
        CacheEntry::stamp(response, strategy, now.max(previous))
    }

    /// Stamp and write `response` under `key`. Returns the stamped entry whether or not the
    /// write reached the backend.
    pub async fn store(
        &self,
        key: &CacheKey,
        response: EdgeResponse,
        strategy: &CacheStrategy,
    ) -> CacheEntry {
        let entry = self.stamp(response, strategy);
        self.put_entry(key, entry.clone(), strategy).await;
        entry
    }

    /// Write an already stamped entry. Returns `true` if the backend accepted it.
    ///
    /// Strategies with a zero TTL never produce a hit, so nothing is written for them.
    pub async fn put_entry(
        &self,
        key: &CacheKey,
        entry: CacheEntry,
        strategy: &CacheStrategy,
    ) -> bool {
        if strategy.is_no_cache() {
            tracing::debug!(target: "cachegate::cache", key = %key, "no-cache strategy; store skipped");
            return false;
        }
        match self.backend.put(key, entry).await {
            Ok(()) => {
                self.stats.stores.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    target: "cachegate::cache",
                    key = %key,
                    ttl_secs = strategy.ttl_seconds(),
                    "response cached"
                );
                true
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    target: "cachegate::cache",
                    key = %key,
                    backend = self.backend.name(),
                    error = %e,
                    "cache store failed; response not cached"
                );
                false
            }
        }
    }

    /// Best-effort removal of `key`. Returns whether an entry was removed.
    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        self.delete_quietly(key).await
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Delete `key` only while it still holds the entry stamped `cached_at_millis`.
    ///
    /// A store racing this purge can still land between the re-read and the delete. The
    /// backend has no conditional delete, so the worst case is one extra miss.
    async fn purge_stale(&self, key: &CacheKey, cached_at_millis: u64) {
        match self.backend.match_entry(key).await {
            Ok(Some(current)) if current.cached_at_millis == cached_at_millis => {
                self.delete_quietly(key).await;
            }
            Ok(_) => {
                tracing::debug!(
                    target: "cachegate::cache",
                    key = %key,
                    "entry replaced; purge skipped"
                );
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    target: "cachegate::cache",
                    key = %key,
                    backend = self.backend.name(),
                    error = %e,
                    "cache purge re-read failed"
                );
            }
        }
    }

    async fn delete_quietly(&self, key: &CacheKey) -> bool {
        match self.backend.delete(key).await {
            Ok(removed) => removed,
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    target: "cachegate::cache",
                    key = %key,
                    backend = self.backend.name(),
                    error = %e,
                    "cache delete failed"
                );
                false
            }
        }
    }
}
