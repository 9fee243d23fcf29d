//! Cache key derivation.

use crate::http::{EdgeRequest, Method};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical identifier of a cached resource.
///
/// Derived from method, path and the raw query string, or supplied verbatim as an override.
/// The query string is used as-is: `?a=1&b=2` and `?b=2&a=1` are different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for `method` + `path` + optional query. An empty query is the same as none.
    ///
    /// ```
    /// use cachegate::cache::CacheKey;
    /// use cachegate::http::Method;
    ///
    /// let key = CacheKey::from_parts(&Method::Get, "/api/listings", Some("page=2"));
    /// assert_eq!(key.as_str(), "GET:/api/listings?page=2");
    /// ```
    pub fn from_parts(method: &Method, path: &str, query: Option<&str>) -> Self {
        match query.filter(|q| !q.is_empty()) {
            Some(q) => Self(format!("{}:{}?{}", method.as_str(), path, q)),
            None => Self(format!("{}:{}", method.as_str(), path)),
        }
    }

    pub fn from_request(req: &EdgeRequest) -> Self {
        Self::from_parts(&req.method, &req.path, req.query.as_deref())
    }

    /// Caller-chosen key, used verbatim.
    pub fn from_override(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::from_override(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::from_override(s)
    }
}
