//! Stored cache entries and the headers they carry.

use crate::http::EdgeResponse;
use crate::strategy::CacheStrategy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Hit/miss marker header.
pub const HEADER_CACHE: &str = "X-Cache";
/// Creation time of the stored entry, epoch millis.
pub const HEADER_CACHED_AT: &str = "X-Cached-At";
/// Entry age in whole seconds, present on hits.
pub const HEADER_AGE: &str = "Age";
pub const HEADER_CACHE_CONTROL: &str = "Cache-Control";

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheSource {
    Hit,
    Miss,
}

impl CacheSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheSource::Hit => "HIT",
            CacheSource::Miss => "MISS",
        }
    }
}

impl fmt::Display for CacheSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A response as persisted in the blob store.
///
/// `cached_at_millis` is the authority on freshness; the backend's own expiry, if it has
/// one, is never consulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub cached_at_millis: u64,
}

impl CacheEntry {
    /// Stamp a downstream response for storage under `strategy`.
    ///
    /// Attaches `Cache-Control`, `X-Cached-At` and the `X-Cache: MISS` marker seen by the
    /// first requester.
    pub fn stamp(response: EdgeResponse, strategy: &CacheStrategy, now_millis: u64) -> Self {
        let EdgeResponse { status, mut headers, body } = response;
        headers.insert(HEADER_CACHE_CONTROL.to_string(), strategy.cache_control());
        headers.insert(HEADER_CACHED_AT.to_string(), now_millis.to_string());
        headers.insert(HEADER_CACHE.to_string(), CacheSource::Miss.as_str().to_string());
        Self { status, headers, body, cached_at_millis: now_millis }
    }

    /// Milliseconds elapsed since the entry was stamped. Clock skew never yields a negative age.
    pub fn age_millis(&self, now_millis: u64) -> u64 {
        now_millis.saturating_sub(self.cached_at_millis)
    }

    /// The entry as a response, unchanged (carries whatever marker it was stored with).
    pub fn to_response(&self) -> EdgeResponse {
        EdgeResponse { status: self.status, headers: self.headers.clone(), body: self.body.clone() }
    }
}

/// A served cache entry plus the observability data attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub entry: CacheEntry,
    pub age_secs: u64,
    pub source: CacheSource,
}

impl CachedResponse {
    /// Response with `X-Cache` and, for hits, `Age` set.
    pub fn into_response(self) -> EdgeResponse {
        let mut response = EdgeResponse {
            status: self.entry.status,
            headers: self.entry.headers,
            body: self.entry.body,
        };
        response.headers.insert(HEADER_CACHE.to_string(), self.source.as_str().to_string());
        if self.source == CacheSource::Hit {
            response.headers.insert(HEADER_AGE.to_string(), self.age_secs.to_string());
        }
        response
    }
}
