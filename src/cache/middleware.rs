use crate::cache::{CacheCoordinator, CacheKey, CacheLookup};
use crate::http::{EdgeRequest, EdgeResponse, Method};
use crate::strategy::CacheStrategy;
use crate::telemetry::{emit_best_effort, CacheEvent, EdgeEvent, NullSink};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

type KeyFn = Arc<dyn Fn(&EdgeRequest) -> CacheKey + Send + Sync>;

/// When a miss's response is written to the blob store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Spawn the write on the Tokio runtime and return the response immediately.
    #[default]
    Detached,
    /// Finish the write before returning the response.
    Awaited,
}

/// A layer that serves GET requests from a [`CacheCoordinator`].
///
/// Non-GET requests pass straight through. On a hit the handler is not called. On a miss the
/// handler runs and, if it answers 2xx, its response is stored under the route's strategy.
#[derive(Clone)]
pub struct CacheLayer<Sink = NullSink> {
    coordinator: Arc<CacheCoordinator>,
    strategy: CacheStrategy,
    key_fn: Option<KeyFn>,
    write_mode: WriteMode,
    sink: Sink,
}

impl<Sink> fmt::Debug for CacheLayer<Sink> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheLayer")
            .field("strategy", &self.strategy)
            .field("key_fn", &self.key_fn.as_ref().map(|_| "<fn>"))
            .field("write_mode", &self.write_mode)
            .finish()
    }
}

impl CacheLayer<NullSink> {
    /// Cache requests under `strategy`.
    pub fn new(coordinator: Arc<CacheCoordinator>, strategy: CacheStrategy) -> Self {
        Self { coordinator, strategy, key_fn: None, write_mode: WriteMode::default(), sink: NullSink }
    }
}

impl<Sink> CacheLayer<Sink> {
    /// Derive keys with `f` instead of method + path + query.
    pub fn with_key_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&EdgeRequest) -> CacheKey + Send + Sync + 'static,
    {
        self.key_fn = Some(Arc::new(f));
        self
    }

    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    /// Attach a telemetry sink.
    pub fn with_sink<NewSink>(self, sink: NewSink) -> CacheLayer<NewSink> {
        CacheLayer {
            coordinator: self.coordinator,
            strategy: self.strategy,
            key_fn: self.key_fn,
            write_mode: self.write_mode,
            sink,
        }
    }
}

impl<S, Sink: Clone> Layer<S> for CacheLayer<Sink> {
    type Service = CacheService<S, Sink>;

    fn layer(&self, service: S) -> Self::Service {
        CacheService {
            inner: service,
            coordinator: self.coordinator.clone(),
            strategy: self.strategy,
            key_fn: self.key_fn.clone(),
            write_mode: self.write_mode,
            sink: self.sink.clone(),
        }
    }
}

/// Middleware service produced by [`CacheLayer`].
#[derive(Clone)]
pub struct CacheService<S, Sink = NullSink> {
    inner: S,
    coordinator: Arc<CacheCoordinator>,
    strategy: CacheStrategy,
    key_fn: Option<KeyFn>,
    write_mode: WriteMode,
    sink: Sink,
}

impl<S, Sink> fmt::Debug for CacheService<S, Sink> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheService")
            .field("strategy", &self.strategy)
            .field("write_mode", &self.write_mode)
            .finish()
    }
}

impl<S, Sink> Service<EdgeRequest> for CacheService<S, Sink>
where
    S: Service<EdgeRequest, Response = EdgeResponse> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    Sink: tower::Service<EdgeEvent, Response = ()> + Clone + Send + 'static,
    Sink::Error: std::error::Error + Send + 'static,
    Sink::Future: Send + 'static,
{
    type Response = EdgeResponse;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: EdgeRequest) -> Self::Future {
        // The readied service goes with this call; the clone waits for the next poll_ready.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let sink = self.sink.clone();

        if req.method != Method::Get {
            let method = req.method.to_string();
            return Box::pin(async move {
                emit_best_effort(sink, EdgeEvent::Cache(CacheEvent::Bypassed { method })).await;
                inner.call(req).await
            });
        }

        let coordinator = self.coordinator.clone();
        let strategy = self.strategy;
        let write_mode = self.write_mode;
        let key = match &self.key_fn {
            Some(f) => f(&req),
            None => CacheKey::from_request(&req),
        };

        Box::pin(async move {
            match coordinator.lookup(&key, &strategy).await {
                CacheLookup::Hit(cached) => {
                    let event = CacheEvent::Hit { key: key.to_string(), age_secs: cached.age_secs };
                    emit_best_effort(sink, EdgeEvent::Cache(event)).await;
                    return Ok(cached.into_response());
                }
                CacheLookup::Stale { age_secs } => {
                    let event = CacheEvent::Stale { key: key.to_string(), age_secs };
                    emit_best_effort(sink.clone(), EdgeEvent::Cache(event)).await;
                }
                CacheLookup::Miss => {
                    let event = CacheEvent::Miss { key: key.to_string() };
                    emit_best_effort(sink.clone(), EdgeEvent::Cache(event)).await;
                }
            }

            let response = inner.call(req).await?;
            if !response.is_success() || strategy.is_no_cache() {
                return Ok(response);
            }

            let entry = coordinator.stamp(response, &strategy);
            let served = entry.to_response();
            let stored = CacheEvent::Stored { key: key.to_string(), ttl_secs: strategy.ttl_seconds() };
            let write = async move {
                // No-cache strategies returned above, so a rejected write is a backend failure.
                let event = if coordinator.put_entry(&key, entry, &strategy).await {
                    stored
                } else {
                    CacheEvent::BackendError { op: "put" }
                };
                emit_best_effort(sink, EdgeEvent::Cache(event)).await;
            };
            match write_mode {
                WriteMode::Awaited => write.await,
                WriteMode::Detached => {
                    tokio::spawn(write);
                }
            }
            Ok(served)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryBlobStore;
    use crate::clock::ManualClock;
    use crate::telemetry::MemorySink;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::limit::ConcurrencyLimitLayer;
    use tower::util::BoxCloneService;
    use tower::{service_fn, ServiceBuilder, ServiceExt};

    fn counting_handler(
        calls: Arc<AtomicUsize>,
        status: u16,
    ) -> BoxCloneService<EdgeRequest, EdgeResponse, Infallible> {
        BoxCloneService::new(service_fn(move |req: EdgeRequest| {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok::<_, Infallible>(EdgeResponse::new(status, format!("{} #{}", req.path, n)))
            }
        }))
    }

    fn layer(clock: &ManualClock) -> (CacheLayer<MemorySink>, InMemoryBlobStore, MemorySink) {
        let store = InMemoryBlobStore::new();
        let coordinator = Arc::new(CacheCoordinator::new(store.clone()).with_clock(clock.clone()));
        let sink = MemorySink::new();
        let layer = CacheLayer::new(coordinator, CacheStrategy::API)
            .with_write_mode(WriteMode::Awaited)
            .with_sink(sink.clone());
        (layer, store, sink)
    }

    #[tokio::test]
    async fn second_get_is_served_from_cache() {
        let clock = ManualClock::new(0);
        let (layer, _, sink) = layer(&clock);
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = layer.layer(counting_handler(calls.clone(), 200));

        let first = svc.clone().oneshot(EdgeRequest::get("/api/items")).await.unwrap();
        assert_eq!(first.header("X-Cache"), Some("MISS"));
        assert_eq!(first.header("Cache-Control"), Some("public, max-age=300"));

        clock.advance(42_000);
        let second = svc.oneshot(EdgeRequest::get("/api/items")).await.unwrap();
        assert_eq!(second.header("X-Cache"), Some("HIT"));
        assert_eq!(second.header("Age"), Some("42"));
        assert_eq!(second.body, first.body);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let events = sink.events();
        assert!(events.contains(&EdgeEvent::Cache(CacheEvent::Stored {
            key: "GET:/api/items".into(),
            ttl_secs: 300
        })));
        assert!(events.contains(&EdgeEvent::Cache(CacheEvent::Hit {
            key: "GET:/api/items".into(),
            age_secs: 42
        })));
    }

    #[tokio::test]
    async fn non_get_bypasses_cache() {
        let clock = ManualClock::new(0);
        let (layer, store, sink) = layer(&clock);
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = layer.layer(counting_handler(calls.clone(), 200));

        for _ in 0..2 {
            let resp = svc
                .clone()
                .oneshot(EdgeRequest::new(Method::Post, "/api/items"))
                .await
                .unwrap();
            assert!(resp.header("X-Cache").is_none());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(store.is_empty());
        assert_eq!(
            sink.events()[0],
            EdgeEvent::Cache(CacheEvent::Bypassed { method: "POST".into() })
        );
    }

    #[tokio::test]
    async fn failed_responses_are_not_cached() {
        let clock = ManualClock::new(0);
        let (layer, store, _) = layer(&clock);
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = layer.layer(counting_handler(calls.clone(), 502));

        let resp = svc.clone().oneshot(EdgeRequest::get("/api/items")).await.unwrap();
        assert_eq!(resp.status, 502);
        assert!(resp.header("X-Cache").is_none());
        svc.oneshot(EdgeRequest::get("/api/items")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn key_fn_overrides_derived_key() {
        let clock = ManualClock::new(0);
        let (layer, store, _) = layer(&clock);
        let layer = layer.with_key_fn(|req: &EdgeRequest| CacheKey::from_override(req.path.clone()));
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = layer.layer(counting_handler(calls.clone(), 200));

        svc.clone().oneshot(EdgeRequest::get("/report").with_query("a=1")).await.unwrap();
        let hit = svc.oneshot(EdgeRequest::get("/report").with_query("b=2")).await.unwrap();
        assert_eq!(hit.header("X-Cache"), Some("HIT"));
        assert!(store.peek(&CacheKey::from("/report")).is_some());
    }

    #[tokio::test]
    async fn detached_write_lands_eventually() {
        let store = InMemoryBlobStore::new();
        let coordinator =
            Arc::new(CacheCoordinator::new(store.clone()).with_clock(ManualClock::new(0)));
        let layer = CacheLayer::new(coordinator, CacheStrategy::STATIC);
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = layer.layer(counting_handler(calls, 200));

        let resp = svc.oneshot(EdgeRequest::get("/logo.svg")).await.unwrap();
        assert_eq!(resp.header("X-Cache"), Some("MISS"));

        let key = CacheKey::from("GET:/logo.svg");
        for _ in 0..50 {
            if store.peek(&key).is_some() {
                return;
            }
            tokio::task::yield_now().await;
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        panic!("detached store never completed");
    }

    #[derive(Debug)]
    struct ReadOnlyStore;

    #[async_trait::async_trait]
    impl crate::cache::BlobStore for ReadOnlyStore {
        async fn match_entry(
            &self,
            _: &CacheKey,
        ) -> Result<Option<crate::cache::CacheEntry>, crate::error::BackendError> {
            Ok(None)
        }
        async fn put(
            &self,
            _: &CacheKey,
            _: crate::cache::CacheEntry,
        ) -> Result<(), crate::error::BackendError> {
            Err(crate::error::BackendError::Unavailable("read-only replica".into()))
        }
        async fn delete(&self, _: &CacheKey) -> Result<bool, crate::error::BackendError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn failed_write_still_serves_response() {
        let coordinator = Arc::new(CacheCoordinator::new(ReadOnlyStore));
        let sink = MemorySink::new();
        let layer = CacheLayer::new(coordinator, CacheStrategy::API)
            .with_write_mode(WriteMode::Awaited)
            .with_sink(sink.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = layer.layer(counting_handler(calls, 200));

        let resp = svc.oneshot(EdgeRequest::get("/api/items")).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.header("X-Cache"), Some("MISS"));
        assert_eq!(
            sink.events().last(),
            Some(&EdgeEvent::Cache(CacheEvent::BackendError { op: "put" }))
        );
    }

    #[tokio::test]
    async fn wraps_a_service_that_reserves_capacity_in_poll_ready() {
        let clock = ManualClock::new(0);
        let (layer, _, _) = layer(&clock);
        let calls = Arc::new(AtomicUsize::new(0));
        let mut svc = ServiceBuilder::new()
            .layer(layer)
            .layer(ConcurrencyLimitLayer::new(1))
            .service(counting_handler(calls.clone(), 200));

        let requests = [
            EdgeRequest::get("/api/items"),
            EdgeRequest::new(Method::Post, "/api/items"),
            EdgeRequest::get("/api/items"),
            EdgeRequest::get("/api/other"),
        ];
        let mut cache_headers = Vec::new();
        for req in requests {
            let resp = svc.ready().await.unwrap().call(req).await.unwrap();
            assert_eq!(resp.status, 200);
            cache_headers.push(resp.header("X-Cache").map(str::to_string));
        }
        assert_eq!(
            cache_headers,
            vec![Some("MISS".into()), None, Some("HIT".into()), Some("MISS".into())]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let cloned = svc.clone().oneshot(EdgeRequest::get("/api/other")).await.unwrap();
        assert_eq!(cloned.header("X-Cache"), Some("HIT"));
    }
}
