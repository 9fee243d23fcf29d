use async_trait::async_trait;
use cachegate::cache::{CacheEntry, CacheLookup};
use cachegate::{
    BackendError, BlobStore, CacheCoordinator, CacheKey, CacheStrategy, EdgeResponse,
    InMemoryBlobStore, ManualClock,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn coordinator() -> (CacheCoordinator, InMemoryBlobStore, ManualClock) {
    let store = InMemoryBlobStore::new();
    let clock = ManualClock::new(0);
    let cache = CacheCoordinator::new(store.clone()).with_clock(clock.clone());
    (cache, store, clock)
}

#[tokio::test]
async fn hit_while_younger_than_ttl_for_every_ttl() {
    for ttl in [0u64, 1, 5, 60, 300] {
        let (cache, _, clock) = coordinator();
        let strategy = CacheStrategy::new(ttl);
        let key = CacheKey::from("GET:/probe");
        // Stored under a caching strategy so that the zero TTL case still has an entry to judge.
        cache.store(&key, EdgeResponse::ok("x"), &CacheStrategy::API).await;

        let probes = [0, ttl.saturating_sub(1) * 1_000 + 999, ttl * 1_000];
        for age_ms in probes {
            clock.set(age_ms);
            let hit = cache.lookup(&key, &strategy).await.is_hit();
            assert_eq!(hit, age_ms < ttl * 1_000, "ttl={ttl}s age={age_ms}ms");
            if !hit {
                break;
            }
        }
    }
}

#[tokio::test]
async fn three_hundred_second_entry_lifecycle() {
    let (cache, store, clock) = coordinator();
    let strategy = CacheStrategy::new(300);
    let key = CacheKey::from("GET:/api/listings?page=2");

    cache.store(&key, EdgeResponse::ok("P"), &strategy).await;

    clock.set(299_000);
    let hit = cache.lookup(&key, &strategy).await.into_hit().unwrap();
    assert_eq!(hit.age_secs, 299);
    assert_eq!(hit.entry.body, b"P".to_vec());

    clock.set(301_000);
    assert!(matches!(cache.lookup(&key, &strategy).await, CacheLookup::Stale { age_secs: 301 }));
    assert!(store.peek(&key).is_none(), "stale entry is purged");

    clock.set(302_000);
    cache.store(&key, EdgeResponse::ok("P2"), &strategy).await;
    clock.set(303_000);
    let hit = cache.lookup(&key, &strategy).await.into_hit().unwrap();
    assert_eq!(hit.entry.cached_at_millis, 302_000);
    assert_eq!(hit.entry.body, b"P2".to_vec());
}

#[tokio::test]
async fn last_write_wins() {
    let (cache, store, clock) = coordinator();
    let key = CacheKey::from("GET:/quote");
    cache.store(&key, EdgeResponse::ok("first"), &CacheStrategy::MARKET_DATA).await;
    clock.advance(10_000);
    cache.store(&key, EdgeResponse::ok("second"), &CacheStrategy::MARKET_DATA).await;

    assert_eq!(store.len(), 1);
    let hit = cache.lookup(&key, &CacheStrategy::MARKET_DATA).await.into_hit().unwrap();
    assert_eq!(hit.entry.cached_at_millis, 10_000);
    assert_eq!(hit.entry.body, b"second".to_vec());
}

#[tokio::test]
async fn no_cache_is_always_a_miss() {
    let (cache, store, _) = coordinator();
    let key = CacheKey::from("GET:/me");
    cache.store(&key, EdgeResponse::ok("private"), &CacheStrategy::NO_CACHE).await;
    assert!(store.is_empty());
    assert!(!cache.lookup(&key, &CacheStrategy::NO_CACHE).await.is_hit());
}

#[tokio::test]
async fn query_order_is_part_of_the_key() {
    let (cache, _, _) = coordinator();
    let a = CacheKey::from_parts(&cachegate::Method::Get, "/search", Some("a=1&b=2"));
    let b = CacheKey::from_parts(&cachegate::Method::Get, "/search", Some("b=2&a=1"));
    assert_ne!(a, b);
    cache.store(&a, EdgeResponse::ok("r"), &CacheStrategy::API).await;
    assert!(cache.lookup(&a, &CacheStrategy::API).await.is_hit());
    assert!(!cache.lookup(&b, &CacheStrategy::API).await.is_hit());
}

/// A store that can be switched off mid-test.
#[derive(Debug, Default)]
struct FlakyStore {
    inner: InMemoryBlobStore,
    down: AtomicBool,
}

impl FlakyStore {
    fn check(&self) -> Result<(), BackendError> {
        if self.down.load(Ordering::SeqCst) {
            Err(BackendError::Unavailable("blob store unreachable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BlobStore for FlakyStore {
    async fn match_entry(&self, key: &CacheKey) -> Result<Option<CacheEntry>, BackendError> {
        self.check()?;
        self.inner.match_entry(key).await
    }
    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), BackendError> {
        self.check()?;
        self.inner.put(key, entry).await
    }
    async fn delete(&self, key: &CacheKey) -> Result<bool, BackendError> {
        self.check()?;
        self.inner.delete(key).await
    }
}

#[tokio::test]
async fn backend_outage_degrades_to_miss() {
    let store = Arc::new(FlakyStore::default());
    let cache = CacheCoordinator::from_arc(store.clone()).with_clock(ManualClock::new(0));
    let key = CacheKey::from("GET:/api/listings");

    cache.store(&key, EdgeResponse::ok("cached"), &CacheStrategy::API).await;
    assert!(cache.lookup(&key, &CacheStrategy::API).await.is_hit());

    store.down.store(true, Ordering::SeqCst);
    assert!(matches!(cache.lookup(&key, &CacheStrategy::API).await, CacheLookup::Miss));
    let entry = cache.store(&key, EdgeResponse::ok("fresh"), &CacheStrategy::API).await;
    assert_eq!(entry.body, b"fresh".to_vec());
    assert!(!cache.invalidate(&key).await);

    store.down.store(false, Ordering::SeqCst);
    let hit = cache.lookup(&key, &CacheStrategy::API).await.into_hit().unwrap();
    assert_eq!(hit.entry.body, b"cached".to_vec(), "failed write left the old entry");

    let stats = cache.stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.errors, 3);
}
