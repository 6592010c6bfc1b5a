//! Chat message format (OpenAI-compatible wire shape).

use serde::{Deserialize, Serialize};

use super::tool::ToolCall;

/// One message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    /// Tool calls requested by the assistant (assistant messages only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Id of the call this message answers (tool messages only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self::plain(MessageRole::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::plain(MessageRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::plain(MessageRole::Assistant, text)
    }

    /// A tool-role message carrying one tool invocation's outcome back to
    /// the model.
    pub fn tool(call_id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
            name: Some(name.into()),
        }
    }

    fn plain(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: text.into(),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_message_serializes_call_id() {
        let msg = ChatMessage::tool("call_1", "lookup", "{\"ok\":true}");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");
        assert_eq!(json["name"], "lookup");
    }

    #[test]
    fn plain_message_omits_tool_fields() {
        let json = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert!(json.get("tool_call_id").is_none());
        assert!(json.get("tool_calls").is_none());
    }
}
