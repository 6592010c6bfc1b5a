//! Orchestrator behavior: ordering under bounded concurrency, caching,
//! and history recording.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use toolcall_runtime::context::{CallContext, ContextConfig};
use toolcall_runtime::orchestrator;
use toolcall_runtime::registry::{tool_fn, RegisteredTool, ToolRegistry};
use toolcall_runtime::types::tool::ToolCall;

/// A tool whose execution time depends on its input, so completion order
/// differs from submission order.
fn staggered_registry() -> Arc<ToolRegistry> {
    let registry = ToolRegistry::new();
    registry
        .register(
            RegisteredTool::new(
                "stagger",
                "Sleep for the requested time, then echo the tag",
                json!({
                    "type": "object",
                    "properties": {
                        "sleep_ms": {"type": "integer"},
                        "tag": {"type": "string"}
                    },
                    "required": ["sleep_ms", "tag"]
                }),
                tool_fn(|args| async move {
                    let ms = args["sleep_ms"].as_u64().unwrap_or(0);
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(json!({"tag": args["tag"]}))
                }),
            ),
            false,
        )
        .unwrap();
    Arc::new(registry)
}

#[tokio::test]
async fn concurrent_results_preserve_input_order() {
    let registry = staggered_registry();
    // First call is the slowest; later calls finish first.
    let calls: Vec<ToolCall> = [120u64, 60, 10, 80, 1]
        .iter()
        .enumerate()
        .map(|(i, ms)| {
            ToolCall::new(
                format!("c{}", i),
                "stagger",
                json!({"sleep_ms": ms, "tag": format!("t{}", i)}),
            )
        })
        .collect();

    let results = orchestrator::execute_all_concurrent(&calls, &registry, 2, None, None).await;

    assert_eq!(results.len(), 5);
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.call_id, format!("c{}", i));
        assert!(result.success, "call {} failed: {:?}", i, result.error);
        assert_eq!(result.result.as_ref().unwrap()["tag"], format!("t{}", i));
    }
}

#[tokio::test]
async fn zero_concurrency_means_unbounded() {
    let registry = staggered_registry();
    let calls: Vec<ToolCall> = (0..3)
        .map(|i| {
            ToolCall::new(
                format!("c{}", i),
                "stagger",
                json!({"sleep_ms": 30, "tag": format!("t{}", i)}),
            )
        })
        .collect();

    let started = std::time::Instant::now();
    let results = orchestrator::execute_all_concurrent(&calls, &registry, 0, None, None).await;
    // All three ran together: total well under the 90 ms sequential time.
    assert!(started.elapsed() < Duration::from_millis(80));
    assert!(results.iter().all(|r| r.success));
}

fn counting_registry(counter: Arc<AtomicUsize>) -> Arc<ToolRegistry> {
    let registry = ToolRegistry::new();
    registry
        .register(
            RegisteredTool::new(
                "count",
                "Count invocations",
                json!({"type": "object", "properties": {"key": {"type": "string"}}}),
                tool_fn(move |args| {
                    let counter = counter.clone();
                    async move {
                        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                        Ok(json!({"invocation": n, "key": args["key"]}))
                    }
                }),
            ),
            false,
        )
        .unwrap();
    Arc::new(registry)
}

#[tokio::test]
async fn cache_returns_identical_payload_and_skips_handler() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let registry = counting_registry(invocations.clone());
    let context = Arc::new(CallContext::new(ContextConfig {
        cache_enabled: true,
        cache_ttl: Duration::from_secs(60),
    }));

    let call = |id: &str| ToolCall::new(id, "count", json!({"key": "same"}));

    let first = orchestrator::execute_all(&[call("c1")], &registry, None, Some(&context)).await;
    let second = orchestrator::execute_all(&[call("c2")], &registry, None, Some(&context)).await;

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(first[0].result, second[0].result);
    // The cached call is still recorded in history under its own call id.
    let history = context.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].call_id, "c2");

    // Different arguments miss the cache.
    let third = orchestrator::execute_all(
        &[ToolCall::new("c3", "count", json!({"key": "other"}))],
        &registry,
        None,
        Some(&context),
    )
    .await;
    assert_eq!(invocations.load(Ordering::SeqCst), 2);
    assert!(third[0].success);
}

#[tokio::test]
async fn cache_expiry_reinvokes_handler() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let registry = counting_registry(invocations.clone());
    let context = Arc::new(CallContext::new(ContextConfig {
        cache_enabled: true,
        cache_ttl: Duration::from_millis(20),
    }));

    let call = |id: &str| ToolCall::new(id, "count", json!({"key": "k"}));
    orchestrator::execute_all(&[call("c1")], &registry, None, Some(&context)).await;
    orchestrator::execute_all(&[call("c2")], &registry, None, Some(&context)).await;
    assert_eq!(invocations.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(40)).await;
    orchestrator::execute_all(&[call("c3")], &registry, None, Some(&context)).await;
    assert_eq!(invocations.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn chains_collect_orchestrated_calls() {
    let registry = staggered_registry();
    let context = Arc::new(CallContext::default());
    context.start_call_chain("conv-7");

    let calls = vec![
        ToolCall::new("c1", "stagger", json!({"sleep_ms": 1, "tag": "a"})),
        ToolCall::new("c2", "stagger", json!({"sleep_ms": 1, "tag": "b"})),
    ];
    orchestrator::execute_all(&calls, &registry, None, Some(&context)).await;
    context.end_call_chain("conv-7");

    let chain = context.chain("conv-7").unwrap();
    assert_eq!(chain.calls.len(), 2);
    assert!(chain.ended_at > chain.started_at);
}

#[tokio::test]
async fn concurrent_execution_with_timeout_keeps_order() {
    let registry = staggered_registry();
    let calls = vec![
        ToolCall::new("c0", "stagger", json!({"sleep_ms": 500, "tag": "slow"})),
        ToolCall::new("c1", "stagger", json!({"sleep_ms": 1, "tag": "fast"})),
    ];
    let results = orchestrator::execute_all_concurrent(
        &calls,
        &registry,
        2,
        Some(Duration::from_millis(80)),
        None,
    )
    .await;

    assert_eq!(results[0].call_id, "c0");
    assert!(!results[0].success);
    assert!(results[0].error.as_deref().unwrap().contains("timed out"));
    assert!(results[1].success);
}
