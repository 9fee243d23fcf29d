//! Request and response values exchanged with the middleware layers.
//!
//! These are deliberately small: routing, bodies streaming and content negotiation belong
//! to the host framework, which converts its own types into [`EdgeRequest`] and back out of
//! [`EdgeResponse`] at the boundary.

use std::collections::BTreeMap;
use std::fmt;

/// Identity used when neither a principal nor a network address is known.
pub const ANONYMOUS_IDENTITY: &str = "anonymous";

/// HTTP request method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    /// Any extension method, stored upper-cased.
    Other(String),
}

impl Method {
    /// Canonical upper-case token.
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Other(m) => m.as_str(),
        }
    }

    /// Parse a method token, case-insensitively.
    pub fn parse(token: &str) -> Self {
        match token.to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "PATCH" => Method::Patch,
            "DELETE" => Method::Delete,
            "OPTIONS" => Method::Options,
            other => Method::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound request as seen by the cache and rate-limit layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRequest {
    pub method: Method,
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    /// Authenticated principal, when the host has one.
    pub principal: Option<String>,
    /// Network origin (usually the client IP).
    pub remote_addr: Option<String>,
}

impl EdgeRequest {
    /// Build a request for `method` and `path`.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), query: None, principal: None, remote_addr: None }
    }

    /// Shorthand for a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Rate-limit identity: the principal when authenticated, otherwise the network origin.
    ///
    /// Authenticated traffic is tracked per account so that users behind one shared address
    /// do not exhaust each other's quota.
    pub fn identity(&self) -> &str {
        self.principal
            .as_deref()
            .or(self.remote_addr.as_deref())
            .unwrap_or(ANONYMOUS_IDENTITY)
    }
}

/// Response produced by a downstream handler or served from cache.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EdgeResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl EdgeResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self { status, headers: BTreeMap::new(), body: body.into() }
    }

    /// A `200 OK` response.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
