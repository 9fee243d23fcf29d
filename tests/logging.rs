mod common;

use async_trait::async_trait;
use cachegate::cache::CacheEntry;
use cachegate::kv::{KvBackend, KvStore};
use cachegate::{
    BackendError, BlobStore, CacheCoordinator, CacheKey, CacheStrategy, EdgeResponse,
    RateLimitPool, SlidingWindowLimiter,
};
use common::test_helpers::capture_logs;
use std::time::Duration;

#[derive(Debug)]
struct Offline;

#[async_trait]
impl BlobStore for Offline {
    async fn match_entry(&self, _: &CacheKey) -> Result<Option<CacheEntry>, BackendError> {
        Err(BackendError::Timeout(Duration::from_millis(500)))
    }
    async fn put(&self, _: &CacheKey, _: CacheEntry) -> Result<(), BackendError> {
        Err(BackendError::Unavailable("503 from origin".into()))
    }
    async fn delete(&self, _: &CacheKey) -> Result<bool, BackendError> {
        Ok(false)
    }
    fn name(&self) -> &'static str {
        "offline"
    }
}

#[async_trait]
impl KvBackend for Offline {
    async fn get(&self, _: &str) -> Result<Option<String>, BackendError> {
        Err(BackendError::Io("connection reset".into()))
    }
    async fn put(&self, _: &str, _: String, _: Option<Duration>) -> Result<(), BackendError> {
        Err(BackendError::Io("connection reset".into()))
    }
    async fn delete(&self, _: &str) -> Result<bool, BackendError> {
        Ok(false)
    }
    async fn list(&self, _: Option<&str>) -> Result<Vec<String>, BackendError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn cache_backend_failures_warn() {
    let (logs, _guard) = capture_logs();
    let cache = CacheCoordinator::new(Offline);
    let key = CacheKey::from("GET:/api/listings");

    assert!(!cache.lookup(&key, &CacheStrategy::API).await.is_hit());
    cache.store(&key, EdgeResponse::ok("x"), &CacheStrategy::API).await;

    let out = logs.contents();
    assert!(out.contains("WARN"), "{out}");
    assert!(out.contains("cachegate::cache"), "{out}");
    assert!(out.contains("cache lookup failed; treating as miss"), "{out}");
    assert!(out.contains("cache store failed; response not cached"), "{out}");
    assert!(out.contains("backend=\"offline\""), "{out}");
}

#[tokio::test]
async fn kv_failures_warn() {
    let (logs, _guard) = capture_logs();
    let kv = KvStore::new(Offline);
    assert_eq!(kv.get::<u32>("counter").await, None);
    assert!(!kv.set("counter", &1u32, None).await);

    let out = logs.contents();
    assert!(out.contains("cachegate::kv"), "{out}");
    assert!(out.contains("kv operation failed; continuing without it"), "{out}");
    assert!(out.contains("connection reset"), "{out}");
}

#[test]
fn redefined_pool_warns_and_last_wins() {
    let (logs, _guard) = capture_logs();
    let limiter = SlidingWindowLimiter::builder()
        .pool(RateLimitPool::new("api", 5, Duration::from_secs(1)).unwrap())
        .pool(RateLimitPool::new("api", 50, Duration::from_secs(1)).unwrap())
        .build()
        .unwrap();
    assert_eq!(limiter.pool("api").map(|p| p.limit()), Some(50));
    assert!(logs.contents().contains("rate-limit pool redefined; last definition wins"));
}
