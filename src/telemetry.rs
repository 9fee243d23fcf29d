//! Telemetry for the cache and rate-limit layers.
//!
//! Both middleware layers emit structured [`EdgeEvent`]s describing what they decided for a
//! request. Events flow into a [`TelemetrySink`], which is just a
//! `tower::Service<EdgeEvent>` so sinks compose with ordinary tower tooling.
//!
//! # Event Types
//!
//! - **Cache**: `Hit`, `Miss`, `Stale`, `Stored`, `Bypassed`, `BackendError`
//! - **Rate limit**: `Admitted`, `Denied`
//!
//! ```rust
//! use cachegate::telemetry::{CacheEvent, EdgeEvent};
//!
//! let hit = EdgeEvent::Cache(CacheEvent::Hit { key: "GET:/api/items".into(), age_secs: 12 });
//! assert!(hit.to_string().contains("Hit"));
//! ```

use std::convert::Infallible;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

/// A telemetry sink that consumes edge events.
pub trait TelemetrySink:
    tower::Service<EdgeEvent, Response = (), Error = Self::SinkError> + Clone + Send + 'static
{
    /// The error type for this sink.
    type SinkError: std::error::Error + Send + 'static;
}

/// Best-effort emit helper that honors `poll_ready` and swallows errors.
///
/// Telemetry must never change a request's outcome: if a sink is not ready or fails, the
/// event is dropped.
pub async fn emit_best_effort<S>(sink: S, event: EdgeEvent)
where
    S: tower::Service<EdgeEvent, Response = ()> + Send + Clone + 'static,
    S::Error: std::error::Error + Send + 'static,
    S::Future: Send + 'static,
{
    use tower::ServiceExt;

    if let Ok(mut ready_sink) = sink.ready_oneshot().await {
        let _ = ready_sink.call(event).await;
    }
}

/// Events emitted by the middleware layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeEvent {
    Cache(CacheEvent),
    RateLimit(RateLimitEvent),
}

/// Cache decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// Served from cache.
    Hit { key: String, age_secs: u64 },
    /// Nothing stored under the key.
    Miss { key: String },
    /// An entry existed but had outlived its TTL and was purged.
    Stale { key: String, age_secs: u64 },
    /// A downstream response was written to the blob store.
    Stored { key: String, ttl_secs: u64 },
    /// Request method is not cacheable; the cache was not consulted.
    Bypassed { method: String },
    /// The blob store rejected a write; the response was served uncached.
    BackendError { op: &'static str },
}

/// Rate-limit decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitEvent {
    Admitted { pool: String, remaining: u32 },
    Denied { pool: String, reset_at_millis: u64 },
}

impl fmt::Display for EdgeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeEvent::Cache(event) => write!(f, "Cache::{}", event),
            EdgeEvent::RateLimit(event) => write!(f, "RateLimit::{}", event),
        }
    }
}

impl fmt::Display for CacheEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheEvent::Hit { key, age_secs } => write!(f, "Hit({}, age={}s)", key, age_secs),
            CacheEvent::Miss { key } => write!(f, "Miss({})", key),
            CacheEvent::Stale { key, age_secs } => write!(f, "Stale({}, age={}s)", key, age_secs),
            CacheEvent::Stored { key, ttl_secs } => write!(f, "Stored({}, ttl={}s)", key, ttl_secs),
            CacheEvent::Bypassed { method } => write!(f, "Bypassed({})", method),
            CacheEvent::BackendError { op } => write!(f, "BackendError({})", op),
        }
    }
}

impl fmt::Display for RateLimitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitEvent::Admitted { pool, remaining } => {
                write!(f, "Admitted({}, remaining={})", pool, remaining)
            }
            RateLimitEvent::Denied { pool, reset_at_millis } => {
                write!(f, "Denied({}, reset_at={})", pool, reset_at_millis)
            }
        }
    }
}

/// A no-op telemetry sink that discards all events.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl Service<EdgeEvent> for NullSink {
    type Response = ();
    type Error = Infallible;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<(), Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _event: EdgeEvent) -> Self::Future {
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for NullSink {
    type SinkError = Infallible;
}

/// A telemetry sink that logs events using the `tracing` crate at INFO level.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl Service<EdgeEvent> for LogSink {
    type Response = ();
    type Error = Infallible;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<(), Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: EdgeEvent) -> Self::Future {
        tracing::info!(target: "cachegate::telemetry", event = %event, "edge_event");
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for LogSink {
    type SinkError = Infallible;
}

/// A bounded in-memory sink, mostly for tests. Oldest events are evicted first.
///
/// # Example
///
/// ```rust
/// use cachegate::telemetry::{EdgeEvent, MemorySink, RateLimitEvent};
/// use tower::Service;
///
/// # #[tokio::main]
/// # async fn main() {
/// let mut sink = MemorySink::new();
/// let event = EdgeEvent::RateLimit(RateLimitEvent::Admitted { pool: "api".into(), remaining: 9 });
/// sink.call(event.clone()).await.unwrap();
/// assert_eq!(sink.events(), vec![event]);
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<EdgeEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    /// Creates a bounded memory sink (default cap: 10,000).
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    /// Creates a bounded memory sink with explicit capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns a snapshot of all events received so far.
    pub fn events(&self) -> Vec<EdgeEvent> {
        self.lock().clone()
    }

    /// Clears all stored events.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns the number of evicted events.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<EdgeEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<EdgeEvent> for MemorySink {
    type Response = ();
    type Error = Infallible;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<(), Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: EdgeEvent) -> Self::Future {
        let mut guard = self.lock();
        if guard.len() >= self.capacity {
            guard.remove(0);
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        guard.push(event);
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for MemorySink {
    type SinkError = Infallible;
}
