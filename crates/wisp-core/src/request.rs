//! HTTP Request types

use http::Method;
use smallvec::SmallVec;
use std::net::SocketAddr;

/// HTTP Request
///
/// Only the request head is kept; no route in this server reads a body.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Request path (without query string)
    pub path: String,
    /// Query string (without leading ?)
    pub query: Option<String>,
    /// Request headers (stack-allocated for small header counts)
    pub headers: SmallVec<[(String, String); 16]>,
    /// Peer address of the underlying connection
    pub remote_addr: Option<SocketAddr>,
}

impl Request {
    /// Create a new request
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: SmallVec::new(),
            remote_addr: None,
        }
    }

    /// Get a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Path plus query, as the client sent it
    pub fn url(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }
}

/// Builder for constructing requests (mostly for tests)
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request: Request::new(method, path),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.push((name.into(), value.into()));
        self
    }

    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.request.remote_addr = Some(addr);
        self
    }

    pub fn build(self) -> Request {
        self.request
    }
}

/// Convert a hyper request head to our Request type
pub fn from_hyper_request<B>(req: &hyper::Request<B>, remote_addr: Option<SocketAddr>) -> Request {
    let uri = req.uri();
    let mut request = Request::new(req.method().clone(), uri.path());
    request.query = uri.query().map(|s| s.to_string());
    request.remote_addr = remote_addr;

    for (name, value) in req.headers() {
        if let Ok(v) = value.to_str() {
            request.headers.push((name.to_string(), v.to_string()));
        }
    }

    request
}
