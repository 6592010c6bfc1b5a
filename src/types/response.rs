//! Chat completion response and its non-streaming wire parse.

use serde::{Deserialize, Serialize};

use super::tool::ToolCall;
use crate::{Error, Result};

/// One logical chat response: accumulated text plus any tool calls the
/// model asked for. Produced either by parsing a non-streaming body or by
/// the streaming aggregator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
    pub model: Option<String>,
}

impl ChatResponse {
    /// Parse a non-streaming `{choices:[{message, finish_reason}], model}`
    /// body. Only the first choice is considered.
    pub fn from_json(body: &serde_json::Value) -> Result<Self> {
        let choice = body
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| Error::InvalidRequest("response has no choices".to_string()))?;

        // Non-streaming responses carry `message`; some backends echo the
        // streaming shape with `delta`.
        let message = choice
            .get("message")
            .or_else(|| choice.get("delta"))
            .ok_or_else(|| Error::InvalidRequest("choice has no message".to_string()))?;

        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();

        let tool_calls = match message.get("tool_calls") {
            Some(tc) => serde_json::from_value(tc.clone())?,
            None => Vec::new(),
        };

        Ok(Self {
            content,
            tool_calls,
            finish_reason: choice
                .get("finish_reason")
                .and_then(|f| f.as_str())
                .map(|s| s.to_string()),
            model: body.get("model").and_then(|m| m.as_str()).map(|s| s.to_string()),
        })
    }
}
