//! # toolcall-runtime
//!
//! Execution runtime for LLM tool calling: HTTP transport with retry and
//! connection reuse, SSE stream decoding and aggregation, error
//! classification, a schema-validated tool registry, a function-call
//! orchestrator, and per-conversation call history with result caching.
//!
//! ## Overview
//!
//! The runtime drives one tool-calling round-trip end to end: a chat
//! request goes out through the [`transport`], streaming responses are
//! folded back into one logical response by the [`sse`] pipeline, the
//! [`orchestrator`] validates and executes any tool calls through the
//! [`registry`], records them in the [`context`], and builds the follow-up
//! request that returns results to the model.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use toolcall_runtime::{
//!     ChatClient, ChatMessage, ChatRequest, RegisteredTool, RuntimeConfig, ToolRegistry,
//!     registry::tool_fn,
//! };
//!
//! #[tokio::main]
//! async fn main() -> toolcall_runtime::Result<()> {
//!     let config = RuntimeConfig::new("https://api.example.com/v1", "chat-large")
//!         .with_api_key("sk-...");
//!     let client = ChatClient::new(config);
//!
//!     let registry = Arc::new(ToolRegistry::new());
//!     registry.register(
//!         RegisteredTool::new(
//!             "get_time",
//!             "Current UTC time",
//!             json!({"type": "object", "properties": {}}),
//!             tool_fn(|_| async { Ok(json!({"utc": "2026-01-01T00:00:00Z"})) }),
//!         ),
//!         false,
//!     )?;
//!
//!     let request = ChatRequest::new("chat-large", vec![ChatMessage::user("What time is it?")]);
//!     let response = client.chat_with_tools(request, &registry, None, 4).await?;
//!     println!("{}", response.content);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`transport`] | HTTP execution, connection pool, retry policy |
//! | [`classify`] | Error classification and retry/backoff decisions |
//! | [`sse`] | SSE decoding and streaming response aggregation |
//! | [`types`] | Messages, requests, responses, tool calls |
//! | [`registry`] | Named, schema-validated tools with usage statistics |
//! | [`orchestrator`] | Tool-call execution and follow-up construction |
//! | [`context`] | Call history, call chains, result cache |
//! | [`config`] | Runtime configuration and key resolution |
//! | [`client`] | Chat completion client and tool-calling loop |

pub mod classify;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod registry;
pub mod sse;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::ChatClient;
pub use config::{ModelParams, RetrySettings, RuntimeConfig};
pub use context::{CallChain, CallContext, ContextConfig, ToolCallHistory};
pub use error::{Error, ErrorContext, ErrorInfo, ErrorKind};
pub use registry::{PermissionLevel, RegisteredTool, ToolHandler, ToolRegistry, ToolStats};
pub use sse::{SseDecoder, SseEvent, StreamAggregator};
pub use transport::{HttpTransport, Method, Request, Response, RetryPolicy};
pub use types::{
    message::{ChatMessage, MessageRole},
    request::ChatRequest,
    response::ChatResponse,
    tool::{FunctionCallResult, ToolCall, ToolDefinition},
};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// A pinned, boxed stream alias used at async seams.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;
