//! Chat completion client: ties the transport, the SSE pipeline, and the
//! orchestrator together against a `/chat/completions` endpoint.

use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::config::RuntimeConfig;
use crate::context::CallContext;
use crate::orchestrator;
use crate::registry::ToolRegistry;
use crate::sse::aggregate::TextDeltaCallback;
use crate::sse::{SseDecoder, StreamAggregator};
use crate::transport::{HttpTransport, Request, Response};
use crate::types::{ChatRequest, ChatResponse};
use crate::{classify, Error, Result};

/// Client for an OpenAI-compatible chat completion endpoint.
pub struct ChatClient {
    transport: HttpTransport,
    config: RuntimeConfig,
    api_key: Option<String>,
}

impl ChatClient {
    pub fn new(config: RuntimeConfig) -> Self {
        let api_key = config.resolve_api_key();
        let transport = HttpTransport::new(
            config.retry.to_policy(),
            Default::default(),
            config.request_timeout(),
        );
        Self {
            transport,
            config,
            api_key,
        }
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn build_transport_request(&self, body: serde_json::Value, streaming: bool) -> Request {
        let mut request = Request::post(self.endpoint())
            .with_header("content-type", "application/json")
            .with_header(
                "accept",
                if streaming {
                    "text/event-stream"
                } else {
                    "application/json"
                },
            )
            .with_body(body)
            .with_timeout(self.config.request_timeout());
        if let Some(key) = &self.api_key {
            request = request.with_header("authorization", format!("Bearer {}", key));
        }
        request
    }

    fn prepared(&self, request: &ChatRequest, streaming: bool) -> ChatRequest {
        let mut prepared = request.clone();
        self.config.params_for(&prepared.model).apply_to(&mut prepared);
        prepared.stream = Some(streaming);
        prepared
    }

    fn fail_from(&self, response: &Response, request: &Request) -> Error {
        Error::Classified(classify::from_response(response, Some(request)))
    }

    /// One non-streaming chat completion.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let prepared = self.prepared(request, false);
        let body = serde_json::to_value(&prepared)?;
        let transport_request = self.build_transport_request(body, false);
        let described = format!("POST {}", transport_request.url);

        let response = self.transport.execute(transport_request).await?;
        if !response.is_success() {
            let request_for_context = Request::post(self.endpoint());
            return Err(self.fail_from(&response, &request_for_context));
        }
        debug!(endpoint = described.as_str(), "chat completion succeeded");

        let json: serde_json::Value = serde_json::from_str(&response.body)?;
        ChatResponse::from_json(&json)
    }

    /// Streaming chat completion. Text deltas are forwarded to `on_text`
    /// as they arrive; the aggregated response is returned once the stream
    /// completes. Completion is observed exactly once even when the server
    /// never sends the `[DONE]` terminator.
    pub async fn chat_stream(
        &self,
        request: &ChatRequest,
        on_text: Option<TextDeltaCallback>,
    ) -> Result<ChatResponse> {
        let prepared = self.prepared(request, true);
        let body = serde_json::to_value(&prepared)?;

        let mut aggregator = StreamAggregator::new();
        if let Some(cb) = on_text {
            aggregator = aggregator.with_text_callback(cb);
        }
        let aggregator = Arc::new(Mutex::new(aggregator));
        let sink = aggregator.clone();

        let mut decoder = SseDecoder::new();
        let transport_request = self
            .build_transport_request(body, true)
            .with_stream_handler(Box::new(move |chunk: bytes::Bytes| {
                decoder.feed(&chunk);
                let mut agg = sink.lock().unwrap();
                for event in decoder.drain() {
                    if event.done {
                        agg.on_done();
                    } else if let Ok(json) =
                        serde_json::from_str::<serde_json::Value>(&event.data)
                    {
                        agg.on_chunk_json(&json);
                    }
                }
            }));

        let response = self.transport.execute_stream(transport_request).await?;
        if !response.is_success() {
            let request_for_context = Request::post(self.endpoint());
            return Err(self.fail_from(&response, &request_for_context));
        }

        let mut agg = aggregator.lock().unwrap();
        if !agg.is_done() {
            // Stream ended without an explicit terminator.
            agg.on_done();
        }
        Ok(agg.finalize())
    }

    /// Run the full tool-calling loop: send, execute requested tools,
    /// resend with results, until the model answers without tool calls or
    /// `max_rounds` is reached.
    pub async fn chat_with_tools(
        &self,
        request: ChatRequest,
        registry: &Arc<ToolRegistry>,
        context: Option<&Arc<CallContext>>,
        max_rounds: usize,
    ) -> Result<ChatResponse> {
        let mut current = request;
        if current.tools.is_none() {
            current.tools = Some(registry.definitions());
        }

        for round in 0..max_rounds.max(1) {
            let response = self.chat(&current).await?;
            match orchestrator::process_tool_calls(&response, &current, registry, context).await {
                Some(follow_up) => {
                    info!(round, "tool round executed, resubmitting results");
                    current = follow_up;
                }
                None => return Ok(response),
            }
        }
        // Round budget exhausted: surface whatever the model says next.
        self.chat(&current).await
    }
}
