//! Function-call orchestration: detect tool calls in a model response,
//! execute them (sequentially or with bounded concurrency), and build the
//! follow-up request that feeds results back to the model.
//!
//! The orchestrator always produces a usable follow-up even when calls
//! fail: failures become error-text tool messages so the model can react
//! instead of the conversation dying.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::context::CallContext;
use crate::error::{ErrorInfo, ErrorKind};
use crate::registry::ToolRegistry;
use crate::types::tool::{FunctionCallResult, ToolCall};
use crate::types::{ChatMessage, ChatRequest, ChatResponse};

/// Does the response ask for any tool invocations?
pub fn has_tool_calls(response: &ChatResponse) -> bool {
    !response.tool_calls.is_empty()
}

/// Pure extraction of the requested calls.
pub fn extract_tool_calls(response: &ChatResponse) -> Vec<ToolCall> {
    response.tool_calls.clone()
}

/// Normalize a call's arguments to a JSON value.
///
/// Structured arguments pass through; `null` becomes an empty object; a
/// string is parsed as JSON (unparseable → `None`); anything else passes
/// through untouched.
pub fn parse_arguments(call: &ToolCall) -> Option<Value> {
    match &call.function.arguments {
        Value::Null => Some(Value::Object(serde_json::Map::new())),
        Value::String(s) => serde_json::from_str(s).ok(),
        other => Some(other.clone()),
    }
}

/// Check a call is executable: non-empty id and name, a registered tool,
/// parseable arguments, and a schema match.
pub fn validate(call: &ToolCall, registry: &ToolRegistry) -> bool {
    if call.id.is_empty() || call.function.name.is_empty() {
        return false;
    }
    let Some(schema) = registry.parameters(&call.function.name) else {
        return false;
    };
    let Some(arguments) = parse_arguments(call) else {
        return false;
    };
    crate::registry::schema::validate(&schema, &arguments).is_ok()
}

/// Execute calls one by one, preserving input order.
///
/// With a caching context, a prior result for the same (tool, arguments)
/// pair short-circuits the handler; the hit is still recorded in history
/// under the incoming call id.
pub async fn execute_all(
    calls: &[ToolCall],
    registry: &Arc<ToolRegistry>,
    timeout: Option<Duration>,
    context: Option<&Arc<CallContext>>,
) -> Vec<FunctionCallResult> {
    let mut results = Vec::with_capacity(calls.len());
    for call in calls {
        results.push(execute_one(registry.clone(), call.clone(), timeout, context.cloned()).await);
    }
    results
}

/// Execute calls with at most `max_concurrency` in flight (0 or a value
/// >= the call count means all at once). Results land in a slot addressed
/// by the call's original index, so output order always matches input
/// order regardless of completion order.
pub async fn execute_all_concurrent(
    calls: &[ToolCall],
    registry: &Arc<ToolRegistry>,
    max_concurrency: usize,
    timeout: Option<Duration>,
    context: Option<&Arc<CallContext>>,
) -> Vec<FunctionCallResult> {
    if calls.is_empty() {
        return Vec::new();
    }
    let permits = if max_concurrency == 0 || max_concurrency >= calls.len() {
        calls.len()
    } else {
        max_concurrency
    };
    let semaphore = Arc::new(Semaphore::new(permits));

    let mut handles = Vec::with_capacity(calls.len());
    for (index, call) in calls.iter().cloned().enumerate() {
        let semaphore = semaphore.clone();
        let registry = registry.clone();
        let context = context.cloned();
        handles.push(tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return (
                    index,
                    FunctionCallResult::failed(
                        call.id.clone(),
                        call.function.name.clone(),
                        "execution slot unavailable",
                        Duration::ZERO,
                    ),
                );
            };
            (index, execute_one(registry, call, timeout, context).await)
        }));
    }

    let mut slots: Vec<Option<FunctionCallResult>> = calls.iter().map(|_| None).collect();
    for handle in handles {
        if let Ok((index, result)) = handle.await {
            slots[index] = Some(result);
        }
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.unwrap_or_else(|| {
                FunctionCallResult::failed(
                    calls[i].id.clone(),
                    calls[i].function.name.clone(),
                    "tool task aborted",
                    Duration::ZERO,
                )
            })
        })
        .collect()
}

async fn execute_one(
    registry: Arc<ToolRegistry>,
    call: ToolCall,
    timeout: Option<Duration>,
    context: Option<Arc<CallContext>>,
) -> FunctionCallResult {
    let started = Instant::now();
    let name = call.function.name.clone();

    let Some(arguments) = parse_arguments(&call) else {
        return FunctionCallResult::failed(
            call.id,
            name,
            "arguments are not valid JSON",
            started.elapsed(),
        );
    };

    if let Some(ctx) = context.as_ref().filter(|c| c.caching_enabled()) {
        if let Some(cached) = ctx.get_cached_result(&name, &arguments) {
            debug!(tool = name.as_str(), call_id = call.id.as_str(), "cache hit");
            let result = FunctionCallResult::ok(call.id, name, cached, started.elapsed());
            ctx.record_tool_call(&result, &arguments);
            return result;
        }
    }

    let outcome = match timeout.filter(|t| !t.is_zero()) {
        Some(limit) => {
            // Spawn so an overrun is abandoned (the handler keeps running
            // detached) rather than forcibly interrupted.
            let task_registry = registry.clone();
            let task_name = name.clone();
            let task_args = arguments.clone();
            let handle = tokio::spawn(async move {
                task_registry.execute(&task_name, &task_args, None).await
            });
            match tokio::time::timeout(limit, handle).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(join_err)) => Err(ErrorInfo::new(
                    ErrorKind::Server,
                    500,
                    format!("tool task failed: {}", join_err),
                )),
                Err(_) => {
                    warn!(
                        tool = name.as_str(),
                        timeout_ms = limit.as_millis() as u64,
                        "tool execution timed out; handler abandoned"
                    );
                    Err(ErrorInfo::new(
                        ErrorKind::Timeout,
                        0,
                        format!("tool '{}' timed out after {} ms", name, limit.as_millis()),
                    ))
                }
            }
        }
        None => registry.execute(&name, &arguments, None).await,
    };

    let duration = started.elapsed();
    let result = match outcome {
        Ok(value) => FunctionCallResult::ok(call.id, name, value, duration),
        Err(info) => FunctionCallResult::failed(call.id, name, info.message, duration),
    };
    if let Some(ctx) = context.as_ref() {
        ctx.record_tool_call(&result, &arguments);
    }
    result
}

/// Build the follow-up request: the original messages plus one tool-role
/// message per result, with all sampling and tool fields copied from the
/// original request unchanged.
pub fn build_follow_up_request(
    original_messages: &[ChatMessage],
    results: &[FunctionCallResult],
    original: &ChatRequest,
) -> ChatRequest {
    let mut messages = original_messages.to_vec();
    for result in results {
        let content = match (&result.result, &result.error) {
            (Some(value), _) if result.success => {
                serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
            }
            (_, Some(error)) => format!("Error: {}", error),
            _ => "null".to_string(),
        };
        messages.push(ChatMessage::tool(
            result.call_id.clone(),
            result.tool_name.clone(),
            content,
        ));
    }

    ChatRequest {
        model: original.model.clone(),
        messages,
        temperature: original.temperature,
        max_tokens: original.max_tokens,
        stream: original.stream,
        stop: original.stop.clone(),
        top_p: original.top_p,
        top_k: original.top_k,
        tools: original.tools.clone(),
        tool_choice: original.tool_choice.clone(),
    }
}

/// Drive one tool-calling round-trip: detect calls in `response`, execute
/// them sequentially, and return the follow-up request, or `None` when the
/// response requested no tools.
pub async fn process_tool_calls(
    response: &ChatResponse,
    original_request: &ChatRequest,
    registry: &Arc<ToolRegistry>,
    context: Option<&Arc<CallContext>>,
) -> Option<ChatRequest> {
    if !has_tool_calls(response) {
        return None;
    }
    let calls = extract_tool_calls(response);
    debug!(count = calls.len(), "processing tool calls");

    // The assistant turn that requested the tools has to precede the tool
    // results on the wire.
    let mut messages = original_request.messages.clone();
    messages.push(ChatMessage {
        role: crate::types::MessageRole::Assistant,
        content: response.content.clone(),
        tool_calls: Some(calls.clone()),
        tool_call_id: None,
        name: None,
    });

    let results = execute_all(&calls, registry, None, context).await;
    Some(build_follow_up_request(&messages, &results, original_request))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{tool_fn, RegisteredTool};
    use serde_json::json;

    fn registry_with_echo() -> Arc<ToolRegistry> {
        let registry = ToolRegistry::new();
        registry
            .register(
                RegisteredTool::new(
                    "echo",
                    "Echo arguments",
                    json!({"type": "object"}),
                    tool_fn(|args| async move { Ok(args) }),
                ),
                false,
            )
            .unwrap();
        Arc::new(registry)
    }

    #[test]
    fn parse_arguments_variants() {
        let structured = ToolCall::new("c", "t", json!({"a": 1}));
        assert_eq!(parse_arguments(&structured), Some(json!({"a": 1})));

        let null = ToolCall::new("c", "t", Value::Null);
        assert_eq!(parse_arguments(&null), Some(json!({})));

        let string = ToolCall::new("c", "t", json!("{\"a\":2}"));
        assert_eq!(parse_arguments(&string), Some(json!({"a": 2})));

        let broken = ToolCall::new("c", "t", json!("{nope"));
        assert_eq!(parse_arguments(&broken), None);

        let passthrough = ToolCall::new("c", "t", json!([1, 2]));
        assert_eq!(parse_arguments(&passthrough), Some(json!([1, 2])));
    }

    #[tokio::test]
    async fn validate_checks_id_name_and_schema() {
        let registry = registry_with_echo();
        assert!(validate(&ToolCall::new("c", "echo", json!({})), &registry));
        assert!(!validate(&ToolCall::new("", "echo", json!({})), &registry));
        assert!(!validate(&ToolCall::new("c", "", json!({})), &registry));
        assert!(!validate(&ToolCall::new("c", "ghost", json!({})), &registry));
        assert!(!validate(&ToolCall::new("c", "echo", json!("{bad")), &registry));
    }

    #[tokio::test]
    async fn sequential_execution_preserves_order_and_ids() {
        let registry = registry_with_echo();
        let calls = vec![
            ToolCall::new("c1", "echo", json!({"n": 1})),
            ToolCall::new("c2", "echo", json!({"n": 2})),
        ];
        let results = execute_all(&calls, &registry, None, None).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].call_id, "c1");
        assert_eq!(results[1].call_id, "c2");
        assert_eq!(results[0].result, Some(json!({"n": 1})));
    }

    #[tokio::test]
    async fn failed_calls_still_produce_results() {
        let registry = registry_with_echo();
        let calls = vec![
            ToolCall::new("c1", "ghost", json!({})),
            ToolCall::new("c2", "echo", json!({"ok": true})),
        ];
        let results = execute_all(&calls, &registry, None, None).await;
        assert!(!results[0].success);
        assert!(results[0].error.as_deref().unwrap().contains("not found"));
        assert!(results[1].success);
    }

    #[tokio::test]
    async fn timeout_marks_result_failed_and_abandons_handler() {
        let registry = ToolRegistry::new();
        registry
            .register(
                RegisteredTool::new(
                    "slow",
                    "",
                    json!({"type": "object"}),
                    tool_fn(|_| async {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok(json!("done"))
                    }),
                ),
                false,
            )
            .unwrap();
        let registry = Arc::new(registry);

        let started = Instant::now();
        let results = execute_all(
            &[ToolCall::new("c1", "slow", json!({}))],
            &registry,
            Some(Duration::from_millis(50)),
            None,
        )
        .await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!results[0].success);
        assert!(results[0].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn follow_up_embeds_results_and_copies_fields() {
        let original = ChatRequest::new("m", vec![ChatMessage::user("hi")])
            .with_temperature(0.4)
            .with_tools(vec![]);
        let results = vec![
            FunctionCallResult::ok("c1", "echo", json!({"v": 1}), Duration::ZERO),
            FunctionCallResult::failed("c2", "ghost", "tool not found: ghost", Duration::ZERO),
        ];
        let follow_up = build_follow_up_request(&original.messages, &results, &original);
        assert_eq!(follow_up.messages.len(), 3);
        assert_eq!(follow_up.messages[1].content, "{\"v\":1}");
        assert!(follow_up.messages[2].content.starts_with("Error: "));
        assert_eq!(follow_up.temperature, Some(0.4));
        assert_eq!(follow_up.model, "m");
        assert!(follow_up.tools.is_some());
    }

    #[tokio::test]
    async fn process_tool_calls_returns_none_without_calls() {
        let registry = registry_with_echo();
        let request = ChatRequest::new("m", vec![ChatMessage::user("hi")]);
        let response = ChatResponse::default();
        assert!(process_tool_calls(&response, &request, &registry, None)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn process_tool_calls_builds_full_round_trip() {
        let registry = registry_with_echo();
        let request = ChatRequest::new("m", vec![ChatMessage::user("hi")]);
        let response = ChatResponse {
            content: String::new(),
            tool_calls: vec![ToolCall::new("c1", "echo", json!({"q": 1}))],
            finish_reason: Some("tool_calls".to_string()),
            model: None,
        };
        let follow_up = process_tool_calls(&response, &request, &registry, None)
            .await
            .unwrap();
        // user, assistant (tool_calls), tool result
        assert_eq!(follow_up.messages.len(), 3);
        assert!(follow_up.messages[1].tool_calls.is_some());
        assert_eq!(
            follow_up.messages[2].tool_call_id.as_deref(),
            Some("c1")
        );
    }
}
