//! Tool registry: named, schema-validated callable tools with per-tool
//! usage statistics.
//!
//! One mutex guards the name→definition map and the stats table. Handlers
//! always run with no lock held, so a handler may call back into the
//! registry (e.g. to read statistics) without deadlocking.

pub mod schema;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{ErrorContext, ErrorInfo, ErrorKind};
use crate::types::tool::ToolDefinition;
use crate::{Error, Result};

/// A capability that maps a JSON value to a JSON value or a failure
/// message. Implemented once per tool at registration time.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Value) -> std::result::Result<Value, String>;
}

type HandlerFuture = Pin<Box<dyn Future<Output = std::result::Result<Value, String>> + Send>>;

struct FnHandler {
    f: Box<dyn Fn(Value) -> HandlerFuture + Send + Sync>,
}

#[async_trait]
impl ToolHandler for FnHandler {
    async fn call(&self, arguments: Value) -> std::result::Result<Value, String> {
        (self.f)(arguments).await
    }
}

/// Wrap an async closure as a [`ToolHandler`].
pub fn tool_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Value, String>> + Send + 'static,
{
    Arc::new(FnHandler {
        f: Box::new(move |args| Box::pin(f(args))),
    })
}

/// Caller privilege required to invoke a tool. Total order: a tool
/// registered at level L is callable by callers at level >= L.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PermissionLevel {
    Public,
    Restricted,
    Admin,
}

/// One registered capability.
pub struct RegisteredTool {
    pub name: String,
    pub description: String,
    /// JSON-schema-like parameter definition; must be an object schema.
    pub parameters: Value,
    pub permission: PermissionLevel,
    pub handler: Arc<dyn ToolHandler>,
}

impl RegisteredTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            permission: PermissionLevel::Public,
            handler,
        }
    }

    pub fn with_permission(mut self, permission: PermissionLevel) -> Self {
        self.permission = permission;
        self
    }
}

/// Running per-tool usage statistics, updated on every outcome.
#[derive(Debug, Clone, Default)]
pub struct ToolStats {
    pub calls: u64,
    pub errors: u64,
    /// Cumulative moving average over all outcomes.
    pub avg_duration_ms: f64,
}

impl ToolStats {
    pub fn error_rate(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.errors as f64 / self.calls as f64
        }
    }

    fn record(&mut self, duration: Duration, is_error: bool) {
        self.calls += 1;
        if is_error {
            self.errors += 1;
        }
        let sample = duration.as_secs_f64() * 1_000.0;
        self.avg_duration_ms += (sample - self.avg_duration_ms) / self.calls as f64;
    }
}

struct RegistryInner {
    tools: HashMap<String, RegisteredTool>,
    stats: HashMap<String, ToolStats>,
}

/// Thread-safe registry of callable tools.
pub struct ToolRegistry {
    inner: Mutex<RegistryInner>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                tools: HashMap::new(),
                stats: HashMap::new(),
            }),
        }
    }

    /// Register a tool. Rejects an empty name, a non-object parameter
    /// schema, and duplicates unless `allow_overwrite`.
    pub fn register(&self, tool: RegisteredTool, allow_overwrite: bool) -> Result<()> {
        if tool.name.trim().is_empty() {
            return Err(Error::InvalidRequest("tool name must not be empty".to_string()));
        }
        if !tool.parameters.is_object() {
            return Err(Error::InvalidRequest(format!(
                "tool '{}' parameters must be an object schema",
                tool.name
            )));
        }
        let mut inner = self.inner.lock().unwrap();
        if !allow_overwrite && inner.tools.contains_key(&tool.name) {
            return Err(Error::InvalidRequest(format!(
                "tool '{}' is already registered",
                tool.name
            )));
        }
        debug!(tool = tool.name.as_str(), "registered tool");
        inner.tools.insert(tool.name.clone(), tool);
        Ok(())
    }

    /// Execute a tool by name: lookup, optional permission check, argument
    /// validation, then the handler. Handler failures are converted to a
    /// `Server`-kind error and never propagate. Every outcome updates the
    /// per-tool statistics, keyed by the requested name.
    pub async fn execute(
        &self,
        name: &str,
        arguments: &Value,
        caller: Option<PermissionLevel>,
    ) -> std::result::Result<Value, ErrorInfo> {
        let started = Instant::now();
        let outcome = self.execute_inner(name, arguments, caller).await;
        let duration = started.elapsed();
        let mut inner = self.inner.lock().unwrap();
        inner
            .stats
            .entry(name.to_string())
            .or_default()
            .record(duration, outcome.is_err());
        outcome
    }

    async fn execute_inner(
        &self,
        name: &str,
        arguments: &Value,
        caller: Option<PermissionLevel>,
    ) -> std::result::Result<Value, ErrorInfo> {
        // Clone what the invocation needs out of the critical section;
        // the handler must run with no lock held.
        let (handler, parameters, required_level) = {
            let inner = self.inner.lock().unwrap();
            match inner.tools.get(name) {
                Some(tool) => (
                    tool.handler.clone(),
                    tool.parameters.clone(),
                    tool.permission,
                ),
                None => {
                    return Err(tool_error(
                        ErrorKind::InvalidRequest,
                        404,
                        format!("tool not found: {}", name),
                    ))
                }
            }
        };

        if let Some(level) = caller {
            if level < required_level {
                return Err(tool_error(
                    ErrorKind::InvalidRequest,
                    403,
                    format!("permission denied for tool: {}", name),
                ));
            }
        }

        if let Err(violations) = schema::validate(&parameters, arguments) {
            return Err(tool_error(
                ErrorKind::InvalidRequest,
                400,
                format!("invalid arguments for '{}': {}", name, violations.join("; ")),
            )
            .with_details(Value::Array(
                violations.into_iter().map(Value::String).collect(),
            )));
        }

        handler
            .call(arguments.clone())
            .await
            .map_err(|message| {
                tool_error(
                    ErrorKind::Server,
                    500,
                    format!("tool '{}' failed: {}", name, message),
                )
            })
    }

    /// Wire-format definitions for the request `tools` array.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let inner = self.inner.lock().unwrap();
        let mut defs: Vec<ToolDefinition> = inner
            .tools
            .values()
            .map(|t| ToolDefinition::function(t.name.clone(), t.description.clone(), t.parameters.clone()))
            .collect();
        defs.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        defs
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.lock().unwrap().tools.contains_key(name)
    }

    /// Parameter schema for one tool, if registered.
    pub fn parameters(&self, name: &str) -> Option<Value> {
        self.inner
            .lock()
            .unwrap()
            .tools
            .get(name)
            .map(|t| t.parameters.clone())
    }

    pub fn stats(&self, name: &str) -> Option<ToolStats> {
        self.inner.lock().unwrap().stats.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn tool_error(kind: ErrorKind, code: u16, message: String) -> ErrorInfo {
    ErrorInfo::new(kind, code, message)
        .with_context(ErrorContext::new().with_source("tool_registry"))
}
