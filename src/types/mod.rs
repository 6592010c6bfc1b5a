//! Core wire types: messages, chat requests/responses, and tool calls.

pub mod message;
pub mod request;
pub mod response;
pub mod tool;

pub use message::{ChatMessage, MessageRole};
pub use request::ChatRequest;
pub use response::ChatResponse;
pub use tool::{FunctionCallResult, FunctionSpec, ToolCall, ToolDefinition};
