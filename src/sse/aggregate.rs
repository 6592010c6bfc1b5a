//! Streaming response aggregator.
//!
//! Folds decoded event payloads into one logical [`ChatResponse`]: running
//! text, tool-call fragments keyed by index, and the latest metadata. Owned
//! by the stream handler's closure scope; decode and aggregation are
//! single-threaded per call, so no shared state is involved.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::types::tool::ToolCall;
use crate::types::ChatResponse;

/// Invoked once per incremental text fragment, in arrival order.
pub type TextDeltaCallback = Box<dyn FnMut(&str) + Send>;

/// Invoked exactly once when the stream completes.
pub type CompletionCallback = Box<dyn FnOnce(&ChatResponse) + Send>;

#[derive(Debug, Default)]
struct ToolCallFragment {
    id: String,
    name: String,
    arguments: String,
}

/// Accumulates one streaming chat response.
#[derive(Default)]
pub struct StreamAggregator {
    text: String,
    /// Fragments keyed by a synthetic integer index. `BTreeMap` keeps
    /// final emission sorted ascending.
    fragments: BTreeMap<u32, ToolCallFragment>,
    /// Secondary lookup for fragments that only carry an id, populated the
    /// first time each id is seen.
    id_to_index: HashMap<String, u32>,
    finish_reason: Option<String>,
    model: Option<String>,
    on_text: Option<TextDeltaCallback>,
    on_complete: Option<CompletionCallback>,
    done: bool,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text_callback(mut self, callback: TextDeltaCallback) -> Self {
        self.on_text = Some(callback);
        self
    }

    pub fn with_completion_callback(mut self, callback: CompletionCallback) -> Self {
        self.on_complete = Some(callback);
        self
    }

    /// Fold one decoded event payload into the accumulated state.
    pub fn on_chunk_json(&mut self, json: &Value) {
        if let Some(model) = json.get("model").and_then(|m| m.as_str()) {
            self.model = Some(model.to_string());
        }

        let Some(choice) = json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
        else {
            return;
        };

        if let Some(reason) = choice.get("finish_reason").and_then(|f| f.as_str()) {
            self.finish_reason = Some(reason.to_string());
        }

        let Some(delta) = choice.get("delta").or_else(|| choice.get("message")) else {
            return;
        };

        if let Some(content) = delta.get("content").and_then(|c| c.as_str()) {
            if !content.is_empty() {
                self.text.push_str(content);
                if let Some(cb) = self.on_text.as_mut() {
                    cb(content);
                }
            }
        }

        if let Some(calls) = delta.get("tool_calls").and_then(|t| t.as_array()) {
            for call in calls {
                self.on_tool_fragment(call);
            }
        }
    }

    fn on_tool_fragment(&mut self, call: &Value) {
        let id = call.get("id").and_then(|i| i.as_str());
        let key = match call.get("index").and_then(|i| i.as_u64()) {
            Some(index) => {
                let key = index as u32;
                if let Some(id) = id {
                    self.id_to_index.entry(id.to_string()).or_insert(key);
                }
                key
            }
            None => match id {
                Some(id) => match self.id_to_index.get(id) {
                    Some(key) => *key,
                    None => {
                        let key = self
                            .fragments
                            .keys()
                            .next_back()
                            .map(|k| k + 1)
                            .unwrap_or(0);
                        self.id_to_index.insert(id.to_string(), key);
                        key
                    }
                },
                None => 0,
            },
        };

        let fragment = self.fragments.entry(key).or_default();
        if let Some(id) = id {
            if fragment.id.is_empty() {
                fragment.id = id.to_string();
            }
        }
        if let Some(function) = call.get("function") {
            if let Some(name) = function.get("name").and_then(|n| n.as_str()) {
                fragment.name.push_str(name);
            }
            if let Some(args) = function.get("arguments").and_then(|a| a.as_str()) {
                fragment.arguments.push_str(args);
            }
        }
    }

    /// Build the aggregated response from the current state. Tool calls are
    /// emitted in ascending index order; each `arguments` string is parsed
    /// as JSON when well-formed, otherwise kept raw.
    pub fn finalize(&self) -> ChatResponse {
        let tool_calls = self
            .fragments
            .values()
            .map(|f| {
                let arguments = match serde_json::from_str::<Value>(f.arguments.trim()) {
                    Ok(v) => v,
                    Err(_) => Value::String(f.arguments.clone()),
                };
                ToolCall::new(f.id.clone(), f.name.clone(), arguments)
            })
            .collect();

        ChatResponse {
            content: self.text.clone(),
            tool_calls,
            finish_reason: self.finish_reason.clone(),
            model: self.model.clone(),
        }
    }

    /// Mark the stream complete. Idempotent: the completion callback fires
    /// on the first call only.
    pub fn on_done(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        let response = self.finalize();
        if let Some(cb) = self.on_complete.take() {
            cb(&response);
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}
