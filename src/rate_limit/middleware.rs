use crate::error::{ConfigError, EdgeError};
use crate::http::{EdgeRequest, EdgeResponse};
use crate::rate_limit::{Decision, RateLimiter, SlidingWindowLimiter};
use crate::telemetry::{emit_best_effort, EdgeEvent, NullSink, RateLimitEvent};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// A layer that enforces one pool of a [`RateLimiter`] in front of a handler.
///
/// The caller identity comes from [`EdgeRequest::identity`]. Admitted responses carry the
/// `X-RateLimit-*` headers; denials surface as [`EdgeError::RateLimited`] without calling the
/// handler.
#[derive(Clone, Debug)]
pub struct RateLimitLayer<L = SlidingWindowLimiter, Sink = NullSink> {
    limiter: Arc<L>,
    pool: Arc<str>,
    sink: Sink,
}

impl<L: RateLimiter> RateLimitLayer<L, NullSink> {
    /// Enforce `pool`. Errors with [`ConfigError::UnknownPool`] if the limiter lacks it.
    pub fn new(limiter: Arc<L>, pool: impl Into<String>) -> Result<Self, ConfigError> {
        let pool = pool.into();
        if !limiter.has_pool(&pool) {
            return Err(ConfigError::UnknownPool(pool));
        }
        Ok(Self { limiter, pool: pool.into(), sink: NullSink })
    }
}

impl<L, Sink> RateLimitLayer<L, Sink> {
    /// Attach a telemetry sink.
    pub fn with_sink<NewSink>(self, sink: NewSink) -> RateLimitLayer<L, NewSink> {
        RateLimitLayer { limiter: self.limiter, pool: self.pool, sink }
    }

    pub fn pool(&self) -> &str {
        &self.pool
    }
}

impl<S, L, Sink: Clone> Layer<S> for RateLimitLayer<L, Sink> {
    type Service = RateLimitService<S, L, Sink>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService {
            inner: service,
            limiter: self.limiter.clone(),
            pool: self.pool.clone(),
            sink: self.sink.clone(),
        }
    }
}

/// Middleware service that enforces rate limits.
#[derive(Clone, Debug)]
pub struct RateLimitService<S, L = SlidingWindowLimiter, Sink = NullSink> {
    inner: S,
    limiter: Arc<L>,
    pool: Arc<str>,
    sink: Sink,
}

impl<S, L, Sink> Service<EdgeRequest> for RateLimitService<S, L, Sink>
where
    S: Service<EdgeRequest, Response = EdgeResponse> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    L: RateLimiter + 'static,
    Sink: tower::Service<EdgeEvent, Response = ()> + Clone + Send + 'static,
    Sink::Error: std::error::Error + Send + 'static,
    Sink::Future: Send + 'static,
{
    type Response = EdgeResponse;
    type Error = EdgeError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(EdgeError::Inner)
    }

    fn call(&mut self, req: EdgeRequest) -> Self::Future {
        // The readied service goes with this call; the clone waits for the next poll_ready.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let sink = self.sink.clone();
        let pool = self.pool.clone();
        let decision = self.limiter.check(&pool, req.identity());

        Box::pin(async move {
            let decision = match decision {
                Ok(decision) => decision,
                Err(e) => {
                    // Limiter misconfiguration must not take the route down.
                    tracing::warn!(
                        target: "cachegate::rate_limit",
                        pool = %pool,
                        error = %e,
                        "rate limit check failed; admitting request"
                    );
                    return inner.call(req).await.map_err(EdgeError::Inner);
                }
            };

            match decision {
                Decision::Allowed { remaining, .. } => {
                    let event = RateLimitEvent::Admitted { pool: pool.to_string(), remaining };
                    emit_best_effort(sink, EdgeEvent::RateLimit(event)).await;
                    let mut response = inner.call(req).await.map_err(EdgeError::Inner)?;
                    for (name, value) in decision.headers() {
                        response.headers.insert(name.to_string(), value);
                    }
                    Ok(response)
                }
                Decision::Denied { limit, reset_at_millis, retry_after } => {
                    let event =
                        RateLimitEvent::Denied { pool: pool.to_string(), reset_at_millis };
                    emit_best_effort(sink, EdgeEvent::RateLimit(event)).await;
                    Err(EdgeError::RateLimited {
                        pool: pool.to_string(),
                        limit,
                        reset_at_millis,
                        retry_after,
                    })
                }
            }
        })
    }
}
