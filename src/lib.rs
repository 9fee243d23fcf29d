#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # cachegate
//!
//! Edge caching and sliding-window rate limiting for request pipelines.
//!
//! ## Features
//!
//! - **Response caching** with freshness decided from the entry's own timestamp, so any dumb
//!   blob store can hold the entries
//! - **Strategy catalog** (static, API, market data, user data, no-cache, ...) or custom TTLs
//! - **Sliding-window rate limiting** over independent named pools
//! - **Process-local and durable KV caches** for hot values and longer-lived data
//! - **Tower middleware** for both layers, composable with `ServiceBuilder`
//! - **Injectable clocks** for deterministic tests
//!
//! Caching is strictly an optimization: backend failures degrade to misses and dropped writes,
//! never to failed requests. The only error a requester can see from this crate is a quota
//! denial.
//!
//! ## Quick Start
//!
//! ```rust
//! use cachegate::prelude::*;
//! use std::convert::Infallible;
//! use std::sync::Arc;
//! use tower::{service_fn, ServiceBuilder, ServiceExt};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let limiter = Arc::new(SlidingWindowLimiter::with_default_pools());
//! let cache = Arc::new(CacheCoordinator::new(InMemoryBlobStore::new()));
//!
//! let svc = ServiceBuilder::new()
//!     .layer(RateLimitLayer::new(limiter, RateLimitPool::API).unwrap())
//!     .layer(CacheLayer::new(cache, CacheStrategy::API).with_write_mode(WriteMode::Awaited))
//!     .service(service_fn(|req: EdgeRequest| async move {
//!         Ok::<_, Infallible>(EdgeResponse::ok(format!("listing {}", req.path)))
//!     }));
//!
//! let req = EdgeRequest::get("/api/listings").with_remote_addr("203.0.113.9");
//! let first = svc.clone().oneshot(req.clone()).await.unwrap();
//! assert_eq!(first.header("X-Cache"), Some("MISS"));
//! assert_eq!(first.header("X-RateLimit-Remaining"), Some("99"));
//!
//! let second = svc.oneshot(req).await.unwrap();
//! assert_eq!(second.header("X-Cache"), Some("HIT"));
//! # }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod kv;
pub mod local;
pub mod prelude;
pub mod rate_limit;
pub mod strategy;
pub mod telemetry;

// Re-exports
pub use cache::{
    BlobStore, CacheCoordinator, CacheKey, CacheLayer, CacheLookup, CacheStats, InMemoryBlobStore,
    WriteMode,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EdgeConfig;
pub use error::{BackendError, ConfigError, EdgeError};
pub use http::{EdgeRequest, EdgeResponse, Method};
pub use kv::{InMemoryKvBackend, KvBackend, KvStore};
pub use local::ProcessLocalCache;
pub use rate_limit::{
    Decision, RateLimitLayer, RateLimitPool, RateLimiter, SlidingWindowLimiter,
    SlidingWindowLimiterBuilder,
};
pub use strategy::CacheStrategy;
pub use telemetry::{EdgeEvent, LogSink, MemorySink, NullSink, TelemetrySink};
