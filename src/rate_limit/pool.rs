use crate::error::ConfigError;
use std::time::Duration;

/// A named quota: at most `limit` requests per trailing `window_ms`.
///
/// Validated on construction and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPool {
    name: String,
    limit: u32,
    window_ms: u64,
}

impl RateLimitPool {
    /// Name of the general API pool.
    pub const API: &'static str = "api";
    /// Name of the authentication pool.
    pub const AUTH: &'static str = "auth";
    /// Name of the AI-heavy endpoint pool.
    pub const AI: &'static str = "ai";

    /// Create a validated pool. Errors if `limit` is zero or the window is shorter than 1ms.
    ///
    /// # Examples
    /// ```
    /// use cachegate::RateLimitPool;
    /// use std::time::Duration;
    /// let pool = RateLimitPool::new("search", 50, Duration::from_secs(10)).unwrap();
    /// assert_eq!(pool.window_ms(), 10_000);
    /// assert!(RateLimitPool::new("broken", 0, Duration::from_secs(1)).is_err());
    /// ```
    pub fn new(name: impl Into<String>, limit: u32, window: Duration) -> Result<Self, ConfigError> {
        let name = name.into();
        if limit == 0 {
            return Err(ConfigError::InvalidLimit { pool: name });
        }
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        if window_ms == 0 {
            return Err(ConfigError::InvalidWindow { pool: name });
        }
        Ok(Self { name, limit, window_ms })
    }

    /// 100 requests per minute.
    pub fn api() -> Self {
        Self { name: Self::API.to_string(), limit: 100, window_ms: 60_000 }
    }

    /// 10 requests per minute.
    pub fn auth() -> Self {
        Self { name: Self::AUTH.to_string(), limit: 10, window_ms: 60_000 }
    }

    /// 20 requests per minute.
    pub fn ai() -> Self {
        Self { name: Self::AI.to_string(), limit: 20, window_ms: 60_000 }
    }

    /// The built-in catalog: api, auth, ai.
    pub fn catalog() -> Vec<Self> {
        vec![Self::api(), Self::auth(), Self::ai()]
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}
