//! Per-conversation call context: tool-call history, call chains, and a
//! TTL-bounded result cache.
//!
//! One mutex guards history, chains and cache together; critical sections
//! are short in-memory operations and no other component lock is ever held
//! at the same time.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::types::tool::FunctionCallResult;

/// A recorded invocation. Append-only; never mutated after creation.
#[derive(Debug, Clone)]
pub struct ToolCallHistory {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub timestamp: SystemTime,
    pub duration: Duration,
}

/// Ordered invocations for one conversation turn.
///
/// A chain is open from `start_call_chain` until `end_call_chain` advances
/// `ended_at` past `started_at`; `last_activity` moves on every recorded
/// call while the chain is open.
#[derive(Debug, Clone)]
pub struct CallChain {
    pub conversation_id: String,
    pub calls: Vec<ToolCallHistory>,
    pub started_at: Instant,
    pub ended_at: Instant,
    pub last_activity: Instant,
}

impl CallChain {
    fn open(conversation_id: String) -> Self {
        let now = Instant::now();
        Self {
            conversation_id,
            calls: Vec::new(),
            started_at: now,
            ended_at: now,
            last_activity: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.ended_at == self.started_at
    }
}

struct CacheEntry {
    result: Value,
    written_at: Instant,
}

#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub cache_enabled: bool,
    /// TTL measured from cache-write time. Zero means entries never expire.
    pub cache_ttl: Duration,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl: Duration::from_secs(300),
        }
    }
}

struct ContextInner {
    history: Vec<ToolCallHistory>,
    chains: HashMap<String, CallChain>,
    cache: HashMap<String, CacheEntry>,
}

/// Records tool-call history, tracks call chains, and memoizes successful
/// results by (tool, arguments).
pub struct CallContext {
    config: ContextConfig,
    inner: Mutex<ContextInner>,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new(ContextConfig::default())
    }
}

impl CallContext {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(ContextInner {
                history: Vec::new(),
                chains: HashMap::new(),
                cache: HashMap::new(),
            }),
        }
    }

    pub fn caching_enabled(&self) -> bool {
        self.config.cache_enabled
    }

    /// Append one invocation to the history, to every open chain, and (on
    /// success) to the result cache.
    pub fn record_tool_call(&self, result: &FunctionCallResult, arguments: &Value) {
        let entry = ToolCallHistory {
            call_id: result.call_id.clone(),
            tool_name: result.tool_name.clone(),
            arguments: arguments.clone(),
            result: result.result.clone(),
            error: result.error.clone(),
            timestamp: SystemTime::now(),
            duration: result.duration,
        };

        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        for chain in inner.chains.values_mut().filter(|c| c.is_open()) {
            chain.calls.push(entry.clone());
            chain.last_activity = now;
        }
        if self.config.cache_enabled && result.success {
            if let Some(value) = &result.result {
                let key = cache_key(&result.tool_name, arguments);
                inner.cache.insert(
                    key,
                    CacheEntry {
                        result: value.clone(),
                        written_at: now,
                    },
                );
            }
        }
        inner.history.push(entry);
    }

    /// Cached result for (tool, arguments), if present and not expired.
    /// Expired entries are evicted lazily before the lookup.
    pub fn get_cached_result(&self, tool_name: &str, arguments: &Value) -> Option<Value> {
        let mut inner = self.inner.lock().unwrap();
        let ttl = self.config.cache_ttl;
        if !ttl.is_zero() {
            inner.cache.retain(|_, e| e.written_at.elapsed() <= ttl);
        }
        inner
            .cache
            .get(&cache_key(tool_name, arguments))
            .map(|e| e.result.clone())
    }

    pub fn clear_cache(&self) {
        self.inner.lock().unwrap().cache.clear();
    }

    /// Open a chain for a conversation. Re-opening an id replaces the old
    /// chain.
    pub fn start_call_chain(&self, conversation_id: impl Into<String>) {
        let id = conversation_id.into();
        debug!(conversation_id = id.as_str(), "call chain opened");
        self.inner
            .lock()
            .unwrap()
            .chains
            .insert(id.clone(), CallChain::open(id));
    }

    /// Close a chain: its end time advances past its start time. Returns
    /// false for an unknown id.
    pub fn end_call_chain(&self, conversation_id: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.chains.get_mut(conversation_id) {
            Some(chain) => {
                let now = Instant::now();
                // Guard against a same-instant close so "closed" is always
                // observable as ended_at > started_at.
                chain.ended_at = if now > chain.started_at {
                    now
                } else {
                    chain.started_at + Duration::from_nanos(1)
                };
                true
            }
            None => false,
        }
    }

    pub fn chain(&self, conversation_id: &str) -> Option<CallChain> {
        self.inner.lock().unwrap().chains.get(conversation_id).cloned()
    }

    pub fn history_len(&self) -> usize {
        self.inner.lock().unwrap().history.len()
    }

    pub fn history(&self) -> Vec<ToolCallHistory> {
        self.inner.lock().unwrap().history.clone()
    }
}

fn cache_key(tool_name: &str, arguments: &Value) -> String {
    let serialized = serde_json::to_string(arguments).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(tool_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(serialized.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok_result(call_id: &str, tool: &str, value: Value) -> FunctionCallResult {
        FunctionCallResult::ok(call_id, tool, value, Duration::from_millis(3))
    }

    #[test]
    fn successful_results_are_cached() {
        let ctx = CallContext::default();
        ctx.record_tool_call(&ok_result("c1", "lookup", json!({"v": 1})), &json!({"q": "x"}));
        assert_eq!(
            ctx.get_cached_result("lookup", &json!({"q": "x"})),
            Some(json!({"v": 1}))
        );
        // Different arguments miss.
        assert_eq!(ctx.get_cached_result("lookup", &json!({"q": "y"})), None);
    }

    #[test]
    fn failures_are_recorded_but_not_cached() {
        let ctx = CallContext::default();
        let failed = FunctionCallResult::failed("c1", "lookup", "boom", Duration::ZERO);
        ctx.record_tool_call(&failed, &json!({}));
        assert_eq!(ctx.history_len(), 1);
        assert_eq!(ctx.get_cached_result("lookup", &json!({})), None);
    }

    #[test]
    fn ttl_expiry_evicts_lazily() {
        let ctx = CallContext::new(ContextConfig {
            cache_enabled: true,
            cache_ttl: Duration::from_millis(10),
        });
        ctx.record_tool_call(&ok_result("c1", "t", json!(1)), &json!({}));
        assert!(ctx.get_cached_result("t", &json!({})).is_some());
        std::thread::sleep(Duration::from_millis(25));
        assert!(ctx.get_cached_result("t", &json!({})).is_none());
    }

    #[test]
    fn zero_ttl_never_expires() {
        let ctx = CallContext::new(ContextConfig {
            cache_enabled: true,
            cache_ttl: Duration::ZERO,
        });
        ctx.record_tool_call(&ok_result("c1", "t", json!(1)), &json!({}));
        std::thread::sleep(Duration::from_millis(15));
        assert!(ctx.get_cached_result("t", &json!({})).is_some());
    }

    #[test]
    fn open_chains_collect_calls_until_closed() {
        let ctx = CallContext::default();
        ctx.start_call_chain("conv-1");
        ctx.record_tool_call(&ok_result("c1", "t", json!(1)), &json!({}));
        ctx.record_tool_call(&ok_result("c2", "t", json!(2)), &json!({}));
        assert!(ctx.end_call_chain("conv-1"));

        let chain = ctx.chain("conv-1").unwrap();
        assert!(!chain.is_open());
        assert!(chain.ended_at > chain.started_at);
        assert_eq!(chain.calls.len(), 2);
        assert_eq!(chain.calls[0].call_id, "c1");
        assert_eq!(chain.calls[1].call_id, "c2");

        // Closed chains stop collecting.
        ctx.record_tool_call(&ok_result("c3", "t", json!(3)), &json!({}));
        assert_eq!(ctx.chain("conv-1").unwrap().calls.len(), 2);
    }

    #[test]
    fn multiple_chains_may_be_open_concurrently() {
        let ctx = CallContext::default();
        ctx.start_call_chain("a");
        ctx.start_call_chain("b");
        ctx.record_tool_call(&ok_result("c1", "t", json!(1)), &json!({}));
        assert_eq!(ctx.chain("a").unwrap().calls.len(), 1);
        assert_eq!(ctx.chain("b").unwrap().calls.len(), 1);
    }

    #[test]
    fn ending_unknown_chain_is_false() {
        let ctx = CallContext::default();
        assert!(!ctx.end_call_chain("nope"));
    }

    #[test]
    fn clear_cache_drops_entries() {
        let ctx = CallContext::default();
        ctx.record_tool_call(&ok_result("c1", "t", json!(1)), &json!({}));
        ctx.clear_cache();
        assert!(ctx.get_cached_result("t", &json!({})).is_none());
    }
}
