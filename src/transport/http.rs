//! HTTP transport execution: retry loop, cancellation, streaming reads.

use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::pool::{ConnectionPool, PoolConfig};
use super::{Method, Request, Response, RetryPolicy, StreamHandler};
use crate::classify;
use crate::Result;

/// Correlation header stamped on every logical request. Servers may ignore
/// it; applications can use it to link retries to one logical call.
const REQUEST_ID_HEADER: &str = "x-toolcall-request-id";

/// Executes logical HTTP exchanges with connection reuse and retry.
///
/// HTTP-level failures never surface as `Err`: the last [`Response`] is
/// returned once the retry budget is spent. `Err` is reserved for malformed
/// input (unparseable URL, local client construction failure).
pub struct HttpTransport {
    pool: ConnectionPool,
    policy: RetryPolicy,
    default_timeout: Duration,
}

impl HttpTransport {
    pub fn new(policy: RetryPolicy, pool_config: PoolConfig, default_timeout: Duration) -> Self {
        Self {
            pool: ConnectionPool::new(pool_config),
            policy,
            default_timeout,
        }
    }

    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self::new(policy, PoolConfig::default(), Duration::from_secs(30))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute one logical exchange, retrying retryable failures.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        self.run(request, None).await
    }

    /// Cancellable variant. The token is checked before dispatch and between
    /// retries; once cancellation is observed no further network I/O happens
    /// and the returned response carries the `Cancelled` sentinel.
    pub async fn execute_async(
        &self,
        request: Request,
        cancel: CancellationToken,
    ) -> Result<Response> {
        self.run(request, Some(cancel)).await
    }

    /// Streaming variant: response bytes are pushed to the request's
    /// `stream_handler` as they arrive and `Response.body` stays empty.
    /// Establishment failures retry exactly like [`execute`]; a failure
    /// after bytes started flowing is returned as-is (the handler already
    /// saw data).
    pub async fn execute_stream(&self, request: Request) -> Result<Response> {
        self.run(request, None).await
    }

    async fn run(&self, mut request: Request, cancel: Option<CancellationToken>) -> Result<Response> {
        if let Some(invalid) = validate_headers(&request) {
            return Ok(invalid);
        }

        let mut handler = request.stream_handler.take();
        let request_id = Uuid::new_v4().to_string();
        let mut attempt: u32 = 0;

        loop {
            if cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                return Ok(Response::local_error(0, "Cancelled"));
            }

            let response = self.attempt(&request, &request_id, handler.as_mut()).await?;
            if response.is_success() {
                return Ok(response);
            }

            let info = classify::from_response(&response, Some(&request));
            if !classify::should_retry(&self.policy, &info, attempt) {
                debug!(
                    status = response.status,
                    kind = %info.kind,
                    attempt,
                    request_id = request_id.as_str(),
                    "giving up on request"
                );
                return Ok(response);
            }

            let delay = classify::retry_delay(&self.policy, &info, attempt, Some(&response));
            warn!(
                status = response.status,
                kind = %info.kind,
                attempt,
                delay_ms = delay.as_millis() as u64,
                request_id = request_id.as_str(),
                "retrying request"
            );

            match cancel.as_ref() {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            return Ok(Response::local_error(0, "Cancelled"));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
            attempt += 1;
        }
    }

    async fn attempt(
        &self,
        request: &Request,
        request_id: &str,
        handler: Option<&mut StreamHandler>,
    ) -> Result<Response> {
        let client = self.pool.client_for(&request.url, request.follow_redirects)?;

        let mut builder = match request.method {
            Method::Get => client.get(&request.url),
            Method::Post => client.post(&request.url),
            Method::Put => client.put(&request.url),
            Method::Delete => client.delete(&request.url),
            Method::Patch => client.patch(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        builder = builder.header(REQUEST_ID_HEADER, request_id);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        builder = builder.timeout(request.timeout.unwrap_or(self.default_timeout));

        let resp = match builder.send().await {
            Ok(resp) => resp,
            Err(e) => {
                let text = if e.is_timeout() {
                    format!("timeout: {}", e)
                } else {
                    e.to_string()
                };
                return Ok(Response::local_error(0, text));
            }
        };

        let status = resp.status().as_u16();
        let headers = collect_headers(resp.headers());

        match handler {
            Some(sink) if (200..300).contains(&status) => {
                let mut byte_stream = resp.bytes_stream();
                let mut error_text = None;
                while let Some(chunk) = byte_stream.next().await {
                    match chunk {
                        Ok(bytes) => sink(bytes),
                        Err(e) => {
                            error_text = Some(format!("stream read error: {}", e));
                            break;
                        }
                    }
                }
                Ok(Response {
                    status,
                    headers,
                    body: String::new(),
                    error_text,
                })
            }
            _ => {
                // Error bodies are read even on streaming requests so the
                // classifier can see the vendor envelope.
                let body = resp.text().await.unwrap_or_default();
                Ok(Response {
                    status,
                    headers,
                    body,
                    error_text: None,
                })
            }
        }
    }
}

fn collect_headers(headers: &reqwest::header::HeaderMap) -> HashMap<String, Vec<String>> {
    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in headers {
        if let Ok(v) = value.to_str() {
            out.entry(name.as_str().to_ascii_lowercase())
                .or_default()
                .push(v.to_string());
        }
    }
    out
}

/// Reject header names and values containing control characters before any
/// socket is opened. Status 400 is the local sentinel.
fn validate_headers(request: &Request) -> Option<Response> {
    for (name, value) in &request.headers {
        if name.chars().any(|c| c.is_ascii_control()) || name.is_empty() {
            return Some(Response::local_error(
                400,
                format!("invalid header name: {:?}", name),
            ));
        }
        if value.chars().any(|c| c.is_ascii_control()) {
            return Some(Response::local_error(
                400,
                format!("invalid header value for {}", name),
            ));
        }
    }
    None
}
