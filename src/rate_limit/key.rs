//! Rate limit key derivation from request dimensions.

use http::header::HeaderName;
use http::Request;

/// Which parts of a request make up its rate limit key.
///
/// Requests that agree on every selected dimension share a counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaryBy {
    /// Include the URI path.
    pub path: bool,
    /// Include the HTTP method.
    pub method: bool,
    /// Include the value of each named header (empty when absent).
    pub headers: Vec<HeaderName>,
    /// Joins the selected components.
    pub separator: String,
}

impl Default for VaryBy {
    fn default() -> Self {
        Self::path()
    }
}

impl VaryBy {
    /// Key on the path only.
    pub fn path() -> Self {
        Self {
            path: true,
            method: false,
            headers: Vec::new(),
            separator: "\n".into(),
        }
    }

    /// Also key on the method.
    pub fn with_method(mut self) -> Self {
        self.method = true;
        self
    }

    /// Also key on a header value.
    pub fn with_header(mut self, name: HeaderName) -> Self {
        self.headers.push(name);
        self
    }

    /// Build the key for `req`.
    pub fn key<B>(&self, req: &Request<B>) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(2 + self.headers.len());
        if self.method {
            parts.push(req.method().as_str());
        }
        if self.path {
            parts.push(req.uri().path());
        }
        for name in &self.headers {
            let value = req.headers().get(name).and_then(|v| v.to_str().ok()).unwrap_or("");
            parts.push(value);
        }
        parts.join(&self.separator)
    }
}
