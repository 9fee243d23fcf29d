//! Sliding-window rate limiting.
//!
//! This module provides the building blocks for rate limiting:
//! - [`RateLimitPool`]: a named `{ limit, window }` quota.
//! - [`SlidingWindowLimiter`]: admits or denies per `(pool, identity)`.
//! - [`RateLimitLayer`]: Tower middleware that enforces one pool in front of a handler.
//! - [`Decision`]: the result of a check, carrying the values behind the
//!   `X-RateLimit-*` headers.
//!
//! # Architecture
//!
//! - **Middleware**: `RateLimitLayer` wraps your service. It doesn't know *how* limiting works,
//!   only that it should ask a [`RateLimiter`].
//! - **Logic**: [`SlidingWindow`](strategies::SlidingWindow) holds the admitted timestamps for
//!   one key and does the pruning and counting.
//! - **Storage**: [`WindowStore`](store::WindowStore) owns the windows and guarantees each
//!   check on one key runs without interleaving.
//!
//! At most `limit` requests are admitted in any trailing window of `window` length. Pools are
//! independent, so a burst on the AI endpoints cannot use up the authentication quota.

pub mod middleware;
pub mod pool;
pub mod store;
pub mod strategies;

pub use middleware::{RateLimitLayer, RateLimitService};
pub use pool::RateLimitPool;
pub use store::{InMemoryWindowStore, WindowStore};
pub use strategies::{SlidingWindow, SlidingWindowLimiter, SlidingWindowLimiterBuilder};

use crate::error::ConfigError;
use std::time::Duration;

/// Configured limit header.
pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
/// Remaining quota header.
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
/// Reset time header, epoch seconds.
pub const HEADER_RESET: &str = "X-RateLimit-Reset";

/// Render a reset timestamp (epoch millis) as whole epoch seconds, rounded up.
pub fn reset_header_value(reset_at_millis: u64) -> String {
    reset_at_millis.div_ceil(1_000).to_string()
}

/// The decision returned by a rate limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The request is allowed to proceed.
    Allowed {
        limit: u32,
        /// Permits left in the window after this admission.
        remaining: u32,
        /// When the oldest admission ages out (epoch millis).
        reset_at_millis: u64,
    },
    /// The request is denied; nothing was recorded.
    Denied {
        limit: u32,
        reset_at_millis: u64,
        /// How long until a slot reopens. Useful for `Retry-After`.
        retry_after: Duration,
    },
}

impl Decision {
    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    pub fn limit(&self) -> u32 {
        match self {
            Decision::Allowed { limit, .. } | Decision::Denied { limit, .. } => *limit,
        }
    }

    /// Remaining quota; always zero after a denial.
    pub fn remaining(&self) -> u32 {
        match self {
            Decision::Allowed { remaining, .. } => *remaining,
            Decision::Denied { .. } => 0,
        }
    }

    pub fn reset_at_millis(&self) -> u64 {
        match self {
            Decision::Allowed { reset_at_millis, .. }
            | Decision::Denied { reset_at_millis, .. } => *reset_at_millis,
        }
    }

    /// `(name, value)` pairs for the three informational headers.
    pub fn headers(&self) -> [(&'static str, String); 3] {
        [
            (HEADER_LIMIT, self.limit().to_string()),
            (HEADER_REMAINING, self.remaining().to_string()),
            (HEADER_RESET, reset_header_value(self.reset_at_millis())),
        ]
    }
}

/// Core interface the middleware asks for admission decisions.
pub trait RateLimiter: Send + Sync {
    /// Check, and on success record, one request from `identity` against `pool`.
    fn check(&self, pool: &str, identity: &str) -> Result<Decision, ConfigError>;

    /// Whether `pool` is configured.
    fn has_pool(&self, pool: &str) -> bool;
}
