//! Convenient re-exports for common cachegate types.
pub use crate::{
    cache::{CacheCoordinator, CacheKey, CacheLayer, InMemoryBlobStore, WriteMode},
    clock::{Clock, ManualClock, SystemClock},
    config::EdgeConfig,
    error::{ConfigError, EdgeError},
    http::{EdgeRequest, EdgeResponse, Method},
    kv::{InMemoryKvBackend, KvStore},
    local::ProcessLocalCache,
    rate_limit::{RateLimitLayer, RateLimitPool, SlidingWindowLimiter},
    strategy::CacheStrategy,
};
