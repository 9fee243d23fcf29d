//! Error types for the cache and rate-limit layers
use crate::http::EdgeResponse;
use std::fmt;
use std::time::Duration;

/// Errors surfaced by the middleware stack.
///
/// Only quota exhaustion is produced by this crate; everything else is the downstream
/// handler's own error passed through untouched. Cache failures never appear here.
#[derive(Debug, Clone)]
pub enum EdgeError<E> {
    /// The caller exceeded the quota of a rate-limit pool
    RateLimited {
        pool: String,
        limit: u32,
        /// When the oldest admission in the window ages out (epoch millis)
        reset_at_millis: u64,
        retry_after: Duration,
    },
    /// The underlying handler failed
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for EdgeError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited { pool, limit, retry_after, .. } => write!(
                f,
                "rate limit exceeded for pool '{}' (limit {}, retry after {:?})",
                pool, limit, retry_after
            ),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for EdgeError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            Self::RateLimited { .. } => None,
        }
    }
}

impl<E> EdgeError<E> {
    /// Check if this error is a quota denial
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
    /// Check if this error wraps an inner error.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }
    /// Get the inner error if this is an Inner variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
    /// Borrow the inner error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
    /// Access denial info as (pool, limit, reset_at_millis).
    pub fn rate_limit_details(&self) -> Option<(&str, u32, u64)> {
        match self {
            Self::RateLimited { pool, limit, reset_at_millis, .. } => {
                Some((pool.as_str(), *limit, *reset_at_millis))
            }
            _ => None,
        }
    }

    /// Render a quota denial as a `429 Too Many Requests` response.
    ///
    /// Returns `None` for inner errors, which the host maps with its own policy.
    pub fn to_response(&self) -> Option<EdgeResponse> {
        match self {
            Self::RateLimited { pool, limit, reset_at_millis, retry_after } => {
                let retry_secs = retry_after.as_millis().div_ceil(1000);
                let body = serde_json::json!({
                    "error": "too_many_requests",
                    "pool": pool,
                    "reset_at": reset_at_millis,
                })
                .to_string();
                Some(
                    EdgeResponse::new(429, body)
                        .with_header("Content-Type", "application/json")
                        .with_header("Retry-After", retry_secs.to_string())
                        .with_header(crate::rate_limit::HEADER_LIMIT, limit.to_string())
                        .with_header(crate::rate_limit::HEADER_REMAINING, "0")
                        .with_header(
                            crate::rate_limit::HEADER_RESET,
                            crate::rate_limit::reset_header_value(*reset_at_millis),
                        ),
                )
            }
            Self::Inner(_) => None,
        }
    }
}

/// Wiring mistakes detected at construction time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("rate-limit pool '{pool}': limit must be > 0")]
    InvalidLimit { pool: String },
    #[error("rate-limit pool '{pool}': window must be > 0ms")]
    InvalidWindow { pool: String },
    #[error("rate-limit pool '{0}' is not configured")]
    UnknownPool(String),
    #[error("no rate-limit pools configured")]
    NoPools,
    #[error("unknown cache strategy '{0}'")]
    UnknownStrategy(String),
    #[error("malformed configuration: {0}")]
    Malformed(String),
}

/// Failures reported by external cache and KV backends.
///
/// These never reach a requester: the coordinator and KV wrapper log them and degrade to a
/// miss or a no-op.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend timed out after {0:?}")]
    Timeout(Duration),
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("backend i/o error: {0}")]
    Io(String),
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Serialization(err.to_string())
    }
}
