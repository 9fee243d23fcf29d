//! Response caching.
//!
//! - [`CacheKey`]: canonical identity of a cached resource.
//! - [`CacheEntry`]: a stored response stamped with its creation time.
//! - [`BlobStore`]: the external store entries live in ([`InMemoryBlobStore`] built in).
//! - [`CacheCoordinator`]: lookup/store/invalidate with freshness decided by [`CacheStrategy`].
//! - [`CacheLayer`]: tower middleware putting the coordinator in front of a handler.
//!
//! # Freshness
//!
//! Freshness is decided from the entry's own `cached_at_millis`, never from backend expiry.
//! An entry is served while `age < ttl`; at or past the TTL it is a miss and is purged.
//!
//! ```rust
//! use cachegate::cache::{CacheCoordinator, CacheKey, InMemoryBlobStore};
//! use cachegate::http::EdgeResponse;
//! use cachegate::{CacheStrategy, ManualClock};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let clock = ManualClock::new(0);
//! let cache = CacheCoordinator::new(InMemoryBlobStore::new()).with_clock(clock.clone());
//! let key = CacheKey::from("GET:/api/listings");
//!
//! cache.store(&key, EdgeResponse::ok("[]"), &CacheStrategy::API).await;
//! clock.advance(60_000);
//! assert!(cache.lookup(&key, &CacheStrategy::API).await.is_hit());
//! clock.advance(240_000);
//! assert!(!cache.lookup(&key, &CacheStrategy::API).await.is_hit());
//! # }
//! ```
//!
//! [`CacheStrategy`]: crate::CacheStrategy

pub mod backend;
pub mod coordinator;
pub mod entry;
pub mod key;
pub mod middleware;

pub use backend::{BlobStore, InMemoryBlobStore};
pub use coordinator::{CacheCoordinator, CacheLookup, CacheStats};
pub use entry::{
    CacheEntry, CacheSource, CachedResponse, HEADER_AGE, HEADER_CACHE, HEADER_CACHED_AT,
    HEADER_CACHE_CONTROL,
};
pub use key::CacheKey;
pub use middleware::{CacheLayer, CacheService, WriteMode};
