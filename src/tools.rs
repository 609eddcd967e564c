//! Tool registry and tool interface (C).
//!
//! A [`Tool`] bundles a stable name, a description, a JSON input schema, a
//! [`PermissionLevel`], and an async handler. The [`ToolRegistry`] maps name
//! to tool and exposes `list`/`get`/`execute`/`get_definitions()` — the
//! generalization of the teacher's flat `Vec<Arc<Tool>>` into something the
//! permission policy and parallel executor can address by name.
//!
//! Handlers here still follow the teacher's `Fn(Value) -> Pin<Box<dyn
//! Future<Output = Result<Value>>>>` shape (type erasure over differently-
//! shaped async closures, `Arc` for cheap sharing, `Send + Sync` so tools
//! run on any worker thread). The registry renders a handler's `Value`
//! result to the plain text the backend expects as a tool-result message,
//! truncating oversized output.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::types::{PermissionLevel, ToolCall, ToolDefinition};

/// Tool outputs longer than this are truncated with a trailing marker.
const MAX_OUTPUT_CHARS: usize = 50_000;

/// Default wall-clock budget for a single tool invocation.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// A tool's handler: takes its arguments as a JSON value, returns a JSON
/// value the registry renders to text.
pub type ToolHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync>;

/// An executable tool: name, description, input schema, permission level,
/// and handler.
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    input_schema: Value,
    permission_level: PermissionLevel,
    handler: ToolHandler,
}

impl Tool {
    /// Builds a tool from a raw JSON Schema `input_schema` (passed through
    /// as-is to the backend — unlike the teacher's `Tool::new`, this
    /// doesn't attempt to expand a simplified type-notation shorthand).
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        permission_level: PermissionLevel,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            permission_level,
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    pub fn permission_level(&self) -> PermissionLevel {
        self.permission_level
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
            permission_level: self.permission_level,
        }
    }

    async fn execute(&self, arguments: Value) -> Result<Value> {
        (self.handler)(arguments).await
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("permission_level", &self.permission_level)
            .finish_non_exhaustive()
    }
}

/// Renders a handler's JSON result to the plain text a tool-result message
/// carries, truncating past [`MAX_OUTPUT_CHARS`].
fn render_output(value: Value) -> String {
    let text = match value {
        Value::String(s) => s,
        other => serde_json::to_string_pretty(&other).unwrap_or_default(),
    };
    truncate_output(text)
}

fn truncate_output(text: String) -> String {
    if text.chars().count() <= MAX_OUTPUT_CHARS {
        return text;
    }
    let truncated: String = text.chars().take(MAX_OUTPUT_CHARS).collect();
    let remaining = text.chars().count() - MAX_OUTPUT_CHARS;
    format!("{truncated}...[truncated, {remaining} more characters]")
}

/// Name-keyed registry of tools. The primary registry used by the agent
/// loop; [`ToolRegistry::analysis_registry`] derives a read-only subset for
/// the architect phase and ask-mode auto-approval.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<Tool>>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn register(&mut self, tool: Tool) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn list(&self) -> Vec<&Tool> {
        self.tools.values().map(|t| t.as_ref()).collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Tool>> {
        self.tools.get(name).cloned()
    }

    /// Definitions for every registered tool, in the shape sent to the
    /// backend's `tools` request field.
    pub fn get_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// Runs a tool call, bounding it by the registry's timeout and the
    /// given cancellation token. Returns [`Error::tool_not_found`] if no
    /// tool by that name is registered, [`Error::tool_timeout`] if it
    /// doesn't finish in time, or [`Error::tool_execution_failed`] wrapping
    /// whatever error the handler raised.
    pub async fn execute(&self, cancel: &CancellationToken, call: &ToolCall) -> Result<String> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| Error::tool_not_found(call.name.as_str()))?;
        let args = Value::Object(call.input.clone());

        let run = tool.execute(args);
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::cancelled()),
            result = tokio::time::timeout(self.timeout, run) => {
                match result {
                    Ok(Ok(value)) => Ok(render_output(value)),
                    Ok(Err(e)) => Err(Error::tool_execution_failed(call.name.as_str(), Some(e))),
                    Err(_) => Err(Error::tool_timeout(call.name.as_str())),
                }
            }
        }
    }

    /// A read-only view containing only `permission_level == Read` tools
    /// (spec.md §4.3's analysis registry — used for the architect phase and
    /// ask-mode's auto-approved tier).
    pub fn analysis_registry(&self) -> ToolRegistry {
        let tools = self
            .tools
            .iter()
            .filter(|(_, t)| t.permission_level() == PermissionLevel::Read)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            tools,
            timeout: self.timeout,
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Fluent tool builder, retained from the teacher's `tool()`/`ToolBuilder`
/// idiom, adjusted to require a permission level before building.
pub struct ToolBuilder {
    name: String,
    description: String,
    schema: Value,
    permission_level: PermissionLevel,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: serde_json::json!({"type": "object", "properties": {}, "required": []}),
            permission_level: PermissionLevel::Read,
        }
    }

    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    pub fn permission_level(mut self, level: PermissionLevel) -> Self {
        self.permission_level = level;
        self
    }

    pub fn build<F, Fut>(self, handler: F) -> Tool
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Tool::new(self.name, self.description, self.schema, self.permission_level, handler)
    }
}

pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}
