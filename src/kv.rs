//! Durable key/value storage for longer-lived cache data.
//!
//! [`KvBackend`] is the raw string protocol an external store speaks: `get`, `put` with an
//! optional TTL, `delete` and prefix `list`. [`KvStore`] layers typed values on top, encoding
//! them as JSON, and never lets a backend failure reach the caller.
//!
//! ```rust
//! use cachegate::kv::{InMemoryKvBackend, KvStore};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Quote { symbol: String, price_cents: u64 }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let kv = KvStore::new(InMemoryKvBackend::new());
//! let quote = Quote { symbol: "ACME".into(), price_cents: 12_345 };
//! kv.set("quote:ACME", &quote, Some(1_800)).await;
//!
//! assert_eq!(kv.get::<Quote>("quote:ACME").await, Some(quote));
//! assert_eq!(kv.list(Some("quote:")).await, vec!["quote:ACME".to_string()]);
//! # }
//! ```

use crate::clock::{Clock, SystemClock};
use crate::error::BackendError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// A stored value with its optional deadline (epoch millis).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvValue {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_millis: Option<u64>,
}

impl KvValue {
    /// A value written at `now` that lives for `ttl`, or forever when `ttl` is `None`.
    pub fn new(value: String, now_millis: u64, ttl: Option<Duration>) -> Self {
        let expires_at_millis = ttl.map(|ttl| {
            let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
            now_millis.saturating_add(ttl_ms)
        });
        Self { value, expires_at_millis }
    }

    /// False once `now` is past the deadline.
    pub fn is_live(&self, now_millis: u64) -> bool {
        self.expires_at_millis.map_or(true, |deadline| now_millis <= deadline)
    }
}

/// Raw protocol of a durable KV store.
///
/// Implementations must never return an expired value from `get` or an expired key from
/// `list`. `list` returns keys sorted lexicographically.
#[async_trait]
pub trait KvBackend: Send + Sync + std::fmt::Debug {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Write `value`; with `ttl` of `None` it persists until deleted.
    async fn put(&self, key: &str, value: String, ttl: Option<Duration>)
        -> Result<(), BackendError>;

    /// Remove `key`. Returns whether it was present.
    async fn delete(&self, key: &str) -> Result<bool, BackendError>;

    /// Live keys starting with `prefix` (all live keys for `None`), sorted.
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<String>, BackendError>;

    /// Backend name for logs.
    fn name(&self) -> &'static str {
        "kv"
    }
}

/// In-process [`KvBackend`]. Useful for tests and single-instance deployments.
#[derive(Debug, Clone)]
pub struct InMemoryKvBackend {
    entries: Arc<RwLock<HashMap<String, KvValue>>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryKvBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryKvBackend {
    pub fn new() -> Self {
        Self { entries: Arc::new(RwLock::new(HashMap::new())), clock: Arc::new(SystemClock) }
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvBackend for InMemoryKvBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        match entries.get(key) {
            Some(v) if v.is_live(now) => Ok(Some(v.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), BackendError> {
        let stored = KvValue::new(value, self.clock.now_millis(), ttl);
        self.entries.write().unwrap_or_else(|p| p.into_inner()).insert(key.to_string(), stored);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        Ok(self.entries.write().unwrap_or_else(|p| p.into_inner()).remove(key).is_some())
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<String>, BackendError> {
        let now = self.clock.now_millis();
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(k, v)| v.is_live(now) && prefix.map_or(true, |p| k.starts_with(p)))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn name(&self) -> &'static str {
        "memory-kv"
    }
}

/// Typed, fail-open wrapper over a [`KvBackend`].
///
/// Values are stored as JSON. A value that fails to decode reads as absent. Backend errors are
/// logged at `warn` and turn into absent/empty/no-op results.
#[derive(Debug, Clone)]
pub struct KvStore {
    backend: Arc<dyn KvBackend>,
}

impl KvStore {
    pub fn new<B: KvBackend + 'static>(backend: B) -> Self {
        Self { backend: Arc::new(backend) }
    }

    pub fn from_arc(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                self.warn("get", key, &e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(
                    target: "cachegate::kv",
                    key,
                    error = %e,
                    "stored value did not decode; treating as absent"
                );
                None
            }
        }
    }

    /// Store `value`, expiring after `ttl_seconds` or never when `None`.
    /// Returns whether the backend accepted the write.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl_seconds: Option<u64>,
    ) -> bool {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                self.warn("encode", key, &BackendError::from(e));
                return false;
            }
        };
        match self.backend.put(key, raw, ttl_seconds.map(Duration::from_secs)).await {
            Ok(()) => true,
            Err(e) => {
                self.warn("put", key, &e);
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        match self.backend.delete(key).await {
            Ok(removed) => removed,
            Err(e) => {
                self.warn("delete", key, &e);
                false
            }
        }
    }

    /// Live keys under `prefix`, sorted; empty if the backend fails.
    pub async fn list(&self, prefix: Option<&str>) -> Vec<String> {
        match self.backend.list(prefix).await {
            Ok(keys) => keys,
            Err(e) => {
                self.warn("list", prefix.unwrap_or(""), &e);
                Vec::new()
            }
        }
    }

    fn warn(&self, op: &'static str, key: &str, error: &BackendError) {
        tracing::warn!(
            target: "cachegate::kv",
            op,
            key,
            backend = self.backend.name(),
            error = %error,
            "kv operation failed; continuing without it"
        );
    }
}
