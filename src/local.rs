//! Process-local cache.
//!
//! A small map of hot values scoped to one running instance. It is never persisted and never
//! shared between instances; it exists to save round trips to the external stores.
//!
//! Expiry is lazy: an entry past its deadline is removed when its key is next read. Until then
//! it still occupies a slot and is counted by [`ProcessLocalCache::size`].

use crate::clock::{Clock, SystemClock};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct LocalEntry<V> {
    value: V,
    expires_at_millis: u64,
}

impl<V> LocalEntry<V> {
    fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at_millis
    }
}

/// In-memory TTL cache for one process.
///
/// Cloning yields another handle to the same map.
///
/// # Example
/// ```
/// use cachegate::local::ProcessLocalCache;
/// use cachegate::ManualClock;
///
/// let clock = ManualClock::new(0);
/// let cache = ProcessLocalCache::new().with_clock(clock.clone());
/// cache.set("session:42", "alice".to_string(), 30);
///
/// clock.advance(30_000);
/// assert_eq!(cache.get("session:42").as_deref(), Some("alice"));
/// clock.advance(1);
/// assert_eq!(cache.get("session:42"), None);
/// ```
#[derive(Debug, Clone)]
pub struct ProcessLocalCache<V> {
    entries: Arc<Mutex<HashMap<String, LocalEntry<V>>>>,
    clock: Arc<dyn Clock>,
    max_entries: Option<usize>,
}

impl<V: Clone> Default for ProcessLocalCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> ProcessLocalCache<V> {
    /// Unbounded cache on the wall clock.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock: Arc::new(SystemClock),
            max_entries: None,
        }
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_shared_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Cap the number of stored entries.
    ///
    /// Inserting a new key into a full cache first drops expired entries, then the entry with
    /// the nearest deadline.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max.max(1));
        self
    }

    /// The value for `key`, unless it is missing or past its deadline.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now_millis();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                tracing::trace!(target: "cachegate::local", key, "expired entry dropped");
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Store `value` for `ttl_seconds`, replacing any previous entry.
    pub fn set(&self, key: impl Into<String>, value: V, ttl_seconds: u64) {
        let now = self.clock.now_millis();
        let expires_at_millis = now.saturating_add(ttl_seconds.saturating_mul(1_000));
        let key = key.into();
        let mut entries = self.lock();
        if let Some(max) = self.max_entries {
            if !entries.contains_key(&key) && entries.len() >= max {
                evict(&mut entries, now, max);
            }
        }
        entries.insert(key, LocalEntry { value, expires_at_millis });
    }

    /// Remove `key`. Returns whether an entry (expired or not) was present.
    pub fn delete(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Stored entries, including expired ones not yet read.
    pub fn size(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, LocalEntry<V>>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn evict<V>(entries: &mut HashMap<String, LocalEntry<V>>, now: u64, max: usize) {
    let before = entries.len();
    entries.retain(|_, e| !e.is_expired(now));
    while entries.len() >= max {
        let nearest = entries
            .iter()
            .min_by_key(|(_, e)| e.expires_at_millis)
            .map(|(k, _)| k.clone());
        match nearest {
            Some(k) => {
                entries.remove(&k);
            }
            None => break,
        }
    }
    tracing::debug!(
        target: "cachegate::local",
        evicted = before - entries.len(),
        "process-local cache full"
    );
}
