use crate::cache::{CacheEntry, CacheKey};
use crate::error::BackendError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Blob store holding cached responses, addressed by canonical key.
///
/// Implementations may be remote (an edge KV, an object store, a shared cache service). No
/// expiry guarantees are expected from them: the coordinator decides freshness from the
/// entry's own timestamp.
#[async_trait]
pub trait BlobStore: Send + Sync + std::fmt::Debug {
    /// Fetch the entry stored under `key`.
    async fn match_entry(&self, key: &CacheKey) -> Result<Option<CacheEntry>, BackendError>;

    /// Store `entry` under `key`, replacing whatever was there.
    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), BackendError>;

    /// Remove `key`. Returns whether something was removed; a missing key is not an error.
    async fn delete(&self, key: &CacheKey) -> Result<bool, BackendError>;

    /// Short name for logs.
    fn name(&self) -> &'static str {
        "blob-store"
    }
}

/// Process-memory blob store, useful for single-instance deployments and tests.
#[derive(Default, Clone, Debug)]
pub struct InMemoryBlobStore {
    entries: Arc<RwLock<HashMap<CacheKey, CacheEntry>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Direct read, bypassing freshness checks.
    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).get(key).cloned()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn match_entry(&self, key: &CacheKey) -> Result<Option<CacheEntry>, BackendError> {
        Ok(self.peek(key))
    }

    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), BackendError> {
        let mut guard = self.entries.write().unwrap_or_else(|p| p.into_inner());
        guard.insert(key.clone(), entry);
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool, BackendError> {
        let mut guard = self.entries.write().unwrap_or_else(|p| p.into_inner());
        Ok(guard.remove(key).is_some())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
