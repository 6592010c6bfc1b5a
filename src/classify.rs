//! Error classification and retry decisions.
//!
//! Pure functions over a transport outcome: map status codes and transport
//! failure text to an [`ErrorKind`], refine with the vendor error envelope
//! when the body carries one, and compute retry eligibility and delay.

use std::time::Duration;

use rand::Rng;

use crate::error::{ErrorContext, ErrorInfo, ErrorKind};
use crate::transport::{Request, Response, RetryPolicy};

/// Longest body snippet carried into an error message when the vendor gives
/// us nothing structured.
const BODY_SNIPPET_LEN: usize = 200;

/// Floor for the 429 backoff fallback when no `Retry-After` header came back.
const RATE_LIMIT_MIN_DELAY_MS: u64 = 2_000;

/// Fixed delay for 5xx responses. Server hiccups clear on their own schedule;
/// exponential growth just wastes wall clock here.
const SERVER_ERROR_DELAY_MS: u64 = 1_000;

/// Map a status code (0 = no HTTP status received) and optional transport
/// failure text to an error kind.
pub fn classify(status: u16, transport_error: Option<&str>) -> ErrorKind {
    match status {
        0 => {
            let text = transport_error.unwrap_or_default().to_ascii_lowercase();
            if text.contains("timeout") || text.contains("timed out") {
                ErrorKind::Timeout
            } else {
                ErrorKind::Network
            }
        }
        408 => ErrorKind::Timeout,
        429 => ErrorKind::RateLimit,
        400..=499 => ErrorKind::InvalidRequest,
        500..=599 => ErrorKind::Server,
        _ => ErrorKind::Unknown,
    }
}

/// Build a full [`ErrorInfo`] from a failed response.
///
/// When the body is a JSON vendor envelope (`{"error":{"message","type","code"}}`)
/// its message wins and a "rate"/"timeout" substring in `type` or `code`
/// upgrades the kind. Message fallback order: vendor message, transport
/// error text, truncated body snippet, generic.
pub fn from_response(response: &Response, request: Option<&Request>) -> ErrorInfo {
    let mut kind = classify(response.status, response.error_text.as_deref());
    let mut message = None;
    let mut details = None;

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(&response.body) {
        if let Some(envelope) = json.get("error") {
            if let Some(msg) = envelope.get("message").and_then(|m| m.as_str()) {
                message = Some(msg.to_string());
            }
            let type_or_code = [
                envelope.get("type").and_then(|t| t.as_str()),
                envelope.get("code").and_then(|c| c.as_str()),
            ];
            for field in type_or_code.into_iter().flatten() {
                let f = field.to_ascii_lowercase();
                if f.contains("rate") {
                    kind = ErrorKind::RateLimit;
                } else if f.contains("timeout") {
                    kind = ErrorKind::Timeout;
                }
            }
            details = Some(envelope.clone());
        }
    }

    let message = message
        .or_else(|| response.error_text.clone())
        .or_else(|| {
            let trimmed = response.body.trim();
            if trimmed.is_empty() {
                None
            } else {
                let snippet: String = trimmed.chars().take(BODY_SNIPPET_LEN).collect();
                Some(snippet)
            }
        })
        .unwrap_or_else(|| format!("request failed with status {}", response.status));

    let mut info = ErrorInfo::new(kind, response.status, message);
    if let Some(details) = details {
        info = info.with_details(details);
    }
    if let Some(req) = request {
        info = info.with_context(
            ErrorContext::new()
                .with_url(req.url.clone())
                .with_method(req.method.as_str())
                .with_source("transport"),
        );
    }
    info
}

/// Per-kind attempt cap, applied on top of the policy's retryability map.
///
/// The caps are independent of the global `max_retries` except for
/// `RateLimit`, which is allowed to outlast it: a 429 with a cooperative
/// server is the most recoverable failure there is.
fn attempt_cap(policy: &RetryPolicy, kind: ErrorKind) -> u32 {
    match kind {
        ErrorKind::Network => 3,
        ErrorKind::Timeout => 2,
        ErrorKind::Server => 2,
        ErrorKind::RateLimit => policy.max_retries.max(5),
        ErrorKind::InvalidRequest => 0,
        ErrorKind::Unknown => 0,
    }
}

/// Decide whether a failed attempt should be retried.
///
/// `attempt` is 0-based: the first failure asks with `attempt = 0`.
pub fn should_retry(policy: &RetryPolicy, info: &ErrorInfo, attempt: u32) -> bool {
    if !policy.is_retryable(info.kind) {
        return false;
    }
    attempt < attempt_cap(policy, info.kind)
}

/// Compute the delay before the next attempt.
///
/// For `RateLimit`, a `Retry-After` header wins over any backoff; absent
/// that, exponential backoff runs from a floor of 2 s without ever writing
/// the floor back into the policy. `Server` uses a fixed short delay.
/// Everything else gets plain exponential backoff with optional ±20% jitter.
pub fn retry_delay(
    policy: &RetryPolicy,
    info: &ErrorInfo,
    attempt: u32,
    response: Option<&Response>,
) -> Duration {
    match info.kind {
        ErrorKind::RateLimit => {
            if let Some(after) = response.and_then(parse_retry_after) {
                return after.min(policy.max_delay);
            }
            let base = (policy.initial_delay.as_millis() as u64).max(RATE_LIMIT_MIN_DELAY_MS);
            Duration::from_millis(exponential_ms(base, policy.backoff_multiplier, attempt))
                .min(policy.max_delay)
        }
        ErrorKind::Server => Duration::from_millis(SERVER_ERROR_DELAY_MS).min(policy.max_delay),
        _ => {
            let base = policy.initial_delay.as_millis() as u64;
            let mut delay_ms = exponential_ms(base, policy.backoff_multiplier, attempt)
                .min(policy.max_delay.as_millis() as u64);
            if policy.jitter && delay_ms > 0 {
                let factor = rand::thread_rng().gen_range(0.8..=1.2);
                delay_ms = (delay_ms as f64 * factor) as u64;
            }
            Duration::from_millis(delay_ms)
        }
    }
}

fn exponential_ms(base_ms: u64, multiplier: f64, attempt: u32) -> u64 {
    let factor = multiplier.max(1.0).powi(attempt.min(1_000) as i32);
    let delay = (base_ms as f64) * factor;
    if delay >= u64::MAX as f64 {
        u64::MAX
    } else {
        delay as u64
    }
}

/// Parse a `Retry-After` header: integer seconds, or an HTTP date converted
/// to a delta against now, floored at zero.
fn parse_retry_after(response: &Response) -> Option<Duration> {
    let value = response.header_first("retry-after")?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let when = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = when.signed_duration_since(chrono::Utc::now());
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}
