//! HTTP transport: request/response model, retry policy, connection pool.
//!
//! The transport executes one *logical* exchange: header validation, host
//! pooled connection reuse, and a retry loop driven by the error classifier.
//! HTTP-level failures come back inside [`Response`]; callers inspect the
//! status and `error_text` instead of matching on an `Err`.

pub mod http;
pub mod pool;

pub use http::HttpTransport;

use std::collections::HashMap;
use std::time::Duration;

use once_cell::sync::Lazy;

use crate::error::ErrorKind;

/// Sink for streaming response bytes. Invoked once per chunk, in arrival
/// order, from the transport's read loop.
pub type StreamHandler = Box<dyn FnMut(bytes::Bytes) + Send>;

/// HTTP method subset the runtime speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
        }
    }
}

/// One outbound HTTP call. Built per call and consumed by the transport.
pub struct Request {
    pub method: Method,
    pub url: String,
    /// Multi-valued; names are sent as given, matched case-insensitively
    /// by receivers.
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    /// Per-request override of the transport's default timeout.
    pub timeout: Option<Duration>,
    pub follow_redirects: bool,
    /// When set, response bytes are pushed here and `Response.body` stays
    /// empty.
    pub stream_handler: Option<StreamHandler>,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers.len())
            .field("streaming", &self.stream_handler.is_some())
            .finish()
    }
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
            follow_redirects: true,
            stream_handler: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn with_stream_handler(mut self, handler: StreamHandler) -> Self {
        self.stream_handler = Some(handler);
        self
    }
}

/// HTTP outcome. Read-only downstream of the transport.
#[derive(Debug, Clone, Default)]
pub struct Response {
    /// HTTP status, or 0 when no status was received (socket failure,
    /// cancellation).
    pub status: u16,
    /// Header names lowercased; values in arrival order.
    pub headers: HashMap<String, Vec<String>>,
    pub body: String,
    /// Transport-level failure text when the exchange died below HTTP.
    pub error_text: Option<String>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First value of a header, matched by lowercased name.
    pub fn header_first(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(|v| v.first())
            .map(|s| s.as_str())
    }

    /// Local client-side failure that never reached the wire.
    pub(crate) fn local_error(status: u16, text: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: String::new(),
            error_text: Some(text.into()),
        }
    }
}

/// Default per-kind retryability: transient kinds retry, client errors and
/// unclassifiable failures do not.
pub static DEFAULT_RETRYABLE: Lazy<HashMap<ErrorKind, bool>> = Lazy::new(|| {
    HashMap::from([
        (ErrorKind::Network, true),
        (ErrorKind::Timeout, true),
        (ErrorKind::RateLimit, true),
        (ErrorKind::Server, true),
        (ErrorKind::InvalidRequest, false),
        (ErrorKind::Unknown, false),
    ])
});

/// Retry configuration. Configured once; immutable during a call sequence.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    pub jitter: bool,
    /// Per-error-kind retryability. Kinds absent from the map never retry.
    pub retryable: HashMap<ErrorKind, bool>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: true,
            retryable: DEFAULT_RETRYABLE.clone(),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_retryable(mut self, kind: ErrorKind, retryable: bool) -> Self {
        self.retryable.insert(kind, retryable);
        self
    }

    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retryable.get(&kind).copied().unwrap_or(false)
    }
}
