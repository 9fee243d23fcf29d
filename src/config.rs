//! Declarative configuration for pools and route strategies.
//!
//! ```rust
//! use cachegate::config::EdgeConfig;
//! use cachegate::{CacheStrategy, ManualClock};
//!
//! let config = EdgeConfig::from_json_str(r#"{
//!     "pools": { "search": { "limit": 30, "window_ms": 10000 } },
//!     "routes": {
//!         "/api/listings": "api",
//!         "/api/quotes": { "ttl_seconds": 15 }
//!     }
//! }"#).unwrap();
//!
//! assert_eq!(config.strategy_for("/api/listings").unwrap(), Some(CacheStrategy::API));
//! assert_eq!(config.strategy_for("/api/quotes").unwrap().map(|s| s.ttl_seconds()), Some(15));
//! assert_eq!(config.strategy_for("/health").unwrap(), None);
//!
//! let limiter = config.build_limiter(ManualClock::new(0)).unwrap();
//! assert_eq!(limiter.pool("search").map(|p| p.limit()), Some(30));
//! ```

use crate::clock::Clock;
use crate::error::ConfigError;
use crate::rate_limit::{RateLimitPool, SlidingWindowLimiter};
use crate::strategy::CacheStrategy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Quota of one rate-limit pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub limit: u32,
    pub window_ms: u64,
}

impl PoolConfig {
    fn build(&self, name: &str) -> Result<RateLimitPool, ConfigError> {
        RateLimitPool::new(name, self.limit, Duration::from_millis(self.window_ms))
    }
}

impl From<&RateLimitPool> for PoolConfig {
    fn from(pool: &RateLimitPool) -> Self {
        Self { limit: pool.limit(), window_ms: pool.window_ms() }
    }
}

/// A route's strategy: a catalog name or an inline definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StrategyRef {
    Named(String),
    Inline(CacheStrategy),
}

impl StrategyRef {
    pub fn resolve(&self) -> Result<CacheStrategy, ConfigError> {
        match self {
            StrategyRef::Named(name) => CacheStrategy::from_name(name),
            StrategyRef::Inline(strategy) => Ok(*strategy),
        }
    }
}

/// Pools and route bindings for one deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeConfig {
    /// Rate-limit pools by name
    #[serde(default = "default_pools")]
    pub pools: BTreeMap<String, PoolConfig>,

    /// Cache strategy by route path; unlisted routes are not cached
    #[serde(default)]
    pub routes: BTreeMap<String, StrategyRef>,
}

fn default_pools() -> BTreeMap<String, PoolConfig> {
    RateLimitPool::catalog()
        .iter()
        .map(|pool| (pool.name().to_string(), PoolConfig::from(pool)))
        .collect()
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self { pools: default_pools(), routes: BTreeMap::new() }
    }
}

impl EdgeConfig {
    /// Parse and validate a JSON document. An omitted `pools` section means the built-in
    /// api/auth/ai pools.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every pool and every named strategy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pools.is_empty() {
            return Err(ConfigError::NoPools);
        }
        for (name, pool) in &self.pools {
            pool.build(name)?;
        }
        for strategy in self.routes.values() {
            strategy.resolve()?;
        }
        Ok(())
    }

    /// Build a limiter with every configured pool, reading time from `clock`.
    pub fn build_limiter<C: Clock + 'static>(
        &self,
        clock: C,
    ) -> Result<SlidingWindowLimiter, ConfigError> {
        self.build_limiter_shared(Arc::new(clock))
    }

    pub fn build_limiter_shared(
        &self,
        clock: Arc<dyn Clock>,
    ) -> Result<SlidingWindowLimiter, ConfigError> {
        let mut builder = SlidingWindowLimiter::builder().with_shared_clock(clock);
        for (name, pool) in &self.pools {
            builder = builder.pool(pool.build(name)?);
        }
        builder.build()
    }

    /// The strategy bound to `route`, or `None` if the route is not cached.
    pub fn strategy_for(&self, route: &str) -> Result<Option<CacheStrategy>, ConfigError> {
        self.routes.get(route).map(StrategyRef::resolve).transpose()
    }
}
