//! Tool call and tool definition wire types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A structured request from the model to invoke a named capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_call_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

fn default_call_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Arguments as emitted by the model. Usually a JSON-encoded string,
    /// but some backends send a structured object directly.
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            call_type: default_call_type(),
            function: FunctionCall {
                name: name.into(),
                arguments,
            },
        }
    }
}

/// Wire format for one registered tool, as the chat API expects it:
/// `{"type":"function","function":{"name","description","parameters"}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON-schema-like parameter definition.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionSpec {
                name: name.into(),
                description: Some(description.into()),
                parameters,
            },
        }
    }
}

/// Outcome of one tool invocation.
///
/// `success` and the presence of `result` vs `error` are mutually
/// exclusive; the constructors are the only way to build one.
#[derive(Debug, Clone)]
pub struct FunctionCallResult {
    pub call_id: String,
    pub tool_name: String,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub duration: Duration,
    pub success: bool,
}

impl FunctionCallResult {
    pub fn ok(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        result: serde_json::Value,
        duration: Duration,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            result: Some(result),
            error: None,
            duration,
            success: true,
        }
    }

    pub fn failed(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        error: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            result: None,
            error: Some(error.into()),
            duration,
            success: false,
        }
    }
}
