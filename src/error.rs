use thiserror::Error;

/// Failure taxonomy for classified transport and tool outcomes.
///
/// Every kind maps to a retry decision in [`crate::classify`]; the numeric
/// code carried alongside is the HTTP status, or 0 for socket-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection-level failure before an HTTP status was received.
    Network,
    /// Request or connect timeout (status 408, or transport text says so).
    Timeout,
    /// HTTP 429.
    RateLimit,
    /// Any other 4xx. Never retried.
    InvalidRequest,
    /// 5xx.
    Server,
    /// Anything that doesn't fit the above.
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Server => "server",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Non-sensitive request context attached to a classified error.
///
/// Captures where the failure happened (URL, method, originating component)
/// but never credentials or header values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    pub url: Option<String>,
    pub method: Option<String>,
    /// Component that produced the error (e.g. "transport", "tool_registry").
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// A classified failure: kind, numeric code, message, and optional
/// structured details (parsed vendor error body or a response snippet).
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    /// HTTP status, or 0 when no status was received.
    pub code: u16,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub context: Option<ErrorContext>,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, code: u16, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            details: None,
            context: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Sentinel error for an observed cancellation (no I/O performed).
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Unknown, 0, "Cancelled")
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {}): {}", self.kind, self.code, self.message)?;
        if let Some(ctx) = &self.context {
            let mut parts = Vec::new();
            if let Some(ref m) = ctx.method {
                parts.push(m.clone());
            }
            if let Some(ref u) = ctx.url {
                parts.push(u.clone());
            }
            if !parts.is_empty() {
                write!(f, " [{}]", parts.join(" "))?;
            }
        }
        Ok(())
    }
}

/// Unified error type for the runtime.
///
/// HTTP-level failures are *not* errors at this layer; the transport returns
/// them inside [`crate::transport::Response`] so retry policy can act on them.
/// This enum covers malformed input, local I/O, and configuration problems.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Classified error: {0}")]
    Classified(ErrorInfo),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Extract the classified info when present.
    pub fn info(&self) -> Option<&ErrorInfo> {
        match self {
            Error::Classified(info) => Some(info),
            _ => None,
        }
    }
}

impl From<ErrorInfo> for Error {
    fn from(info: ErrorInfo) -> Self {
        Error::Classified(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context_without_credentials() {
        let info = ErrorInfo::new(ErrorKind::RateLimit, 429, "too many requests").with_context(
            ErrorContext::new()
                .with_method("POST")
                .with_url("https://api.example.com/chat/completions"),
        );
        let text = info.to_string();
        assert!(text.contains("rate_limit"));
        assert!(text.contains("POST"));
        assert!(text.contains("/chat/completions"));
    }

    #[test]
    fn cancelled_sentinel_has_no_status() {
        let info = ErrorInfo::cancelled();
        assert_eq!(info.code, 0);
        assert_eq!(info.message, "Cancelled");
    }
}
