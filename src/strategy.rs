//! Cache freshness strategies.
//!
//! A [`CacheStrategy`] is plain configuration: how long a stored response stays fresh and,
//! optionally, a stale-while-revalidate window that is advertised in `Cache-Control`.
//!
//! ## Catalog
//!
//! | Name | TTL | SWR |
//! |------|-----|-----|
//! | `CACHE_FIRST` | 1h | - |
//! | `NETWORK_FIRST` | 5m | - |
//! | `STALE_WHILE_REVALIDATE` | 1m | 1h |
//! | `NO_CACHE` | 0 | - |
//! | `STATIC` | 24h | - |
//! | `API` | 5m | - |
//! | `MARKET_DATA` | 30m | - |
//! | `USER_DATA` | 1m | - |
//!
//! The stale-while-revalidate window is carried as metadata only. Once an entry is older than
//! its TTL, lookups treat it as a miss; nothing serves it stale or refreshes it in the
//! background.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Immutable freshness configuration for one class of cached responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheStrategy {
    ttl_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stale_while_revalidate_seconds: Option<u64>,
}

impl CacheStrategy {
    /// Serve from cache for up to an hour.
    pub const CACHE_FIRST: CacheStrategy = CacheStrategy::new(3_600);
    /// Short-lived cache in front of the network.
    pub const NETWORK_FIRST: CacheStrategy = CacheStrategy::new(300);
    /// One minute fresh, one hour advertised stale window.
    pub const STALE_WHILE_REVALIDATE: CacheStrategy =
        CacheStrategy::new(60).with_stale_while_revalidate(3_600);
    /// Never a hit.
    pub const NO_CACHE: CacheStrategy = CacheStrategy::new(0);
    /// Static assets.
    pub const STATIC: CacheStrategy = CacheStrategy::new(86_400);
    /// General API responses.
    pub const API: CacheStrategy = CacheStrategy::new(300);
    /// Third-party market data.
    pub const MARKET_DATA: CacheStrategy = CacheStrategy::new(1_800);
    /// Per-user data.
    pub const USER_DATA: CacheStrategy = CacheStrategy::new(60);

    /// Every named strategy, in catalog order.
    pub const CATALOG: [(&'static str, CacheStrategy); 8] = [
        ("CACHE_FIRST", Self::CACHE_FIRST),
        ("NETWORK_FIRST", Self::NETWORK_FIRST),
        ("STALE_WHILE_REVALIDATE", Self::STALE_WHILE_REVALIDATE),
        ("NO_CACHE", Self::NO_CACHE),
        ("STATIC", Self::STATIC),
        ("API", Self::API),
        ("MARKET_DATA", Self::MARKET_DATA),
        ("USER_DATA", Self::USER_DATA),
    ];

    /// Custom strategy with the given TTL.
    pub const fn new(ttl_seconds: u64) -> Self {
        Self { ttl_seconds, stale_while_revalidate_seconds: None }
    }

    /// Attach a stale-while-revalidate window.
    pub const fn with_stale_while_revalidate(self, seconds: u64) -> Self {
        Self { ttl_seconds: self.ttl_seconds, stale_while_revalidate_seconds: Some(seconds) }
    }

    /// Resolve a catalog name. Case and `-`/`_` are ignored, so `"market-data"`,
    /// `"MARKET_DATA"` and `"market_data"` are the same strategy.
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        let wanted = name.trim().replace('-', "_").to_ascii_uppercase();
        Self::CATALOG
            .iter()
            .find(|(n, _)| *n == wanted)
            .map(|(_, s)| *s)
            .ok_or_else(|| ConfigError::UnknownStrategy(name.to_string()))
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn stale_while_revalidate_seconds(&self) -> Option<u64> {
        self.stale_while_revalidate_seconds
    }

    /// True when entries under this strategy can never be served.
    pub fn is_no_cache(&self) -> bool {
        self.ttl_seconds == 0
    }

    /// An entry of age `age_millis` is fresh while strictly younger than the TTL.
    pub fn is_fresh(&self, age_millis: u64) -> bool {
        age_millis < self.ttl_seconds.saturating_mul(1_000)
    }

    /// `Cache-Control` value advertised for stored entries.
    pub fn cache_control(&self) -> String {
        if self.is_no_cache() {
            return "no-store".to_string();
        }
        match self.stale_while_revalidate_seconds {
            Some(swr) => {
                format!("public, max-age={}, stale-while-revalidate={}", self.ttl_seconds, swr)
            }
            None => format!("public, max-age={}", self.ttl_seconds),
        }
    }
}
