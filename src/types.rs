//! Core data types: messages, tool definitions, stream chunks, resolved
//! configuration, context statistics, and the multi-agent pipeline types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

/// A message role. Wire-serialized lowercase to match the backend's
/// `/api/chat` protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A single tool invocation requested by the model (on an assistant
/// message) or executed and reported back (linked via `tool_call_id` on
/// the following tool message).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Stable id, generated by the backend. Correlates a tool-role
    /// message's `tool_call_id` back to this call.
    pub id: String,
    pub name: String,
    /// Named arguments. Always a map, even when the wire form was a
    /// string-encoded object or missing entirely (see `stream.rs`).
    pub input: Map<String, Value>,
    /// Set when `input` parsing failed or degraded; never blocks
    /// execution, just gives the caller something to surface.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parse_error: Option<String>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
            parse_error: None,
        }
    }
}

/// A message in the conversation. `content` is plain text; tool-call
/// linkage is carried in the two optional fields below.
///
/// Invariant: a message with `role == Tool` always has `tool_call_id ==
/// Some(id)` where `id` matches a `ToolCall.id` on an earlier assistant
/// message in the same conversation. Violating this is a programming
/// error — nothing in this crate constructs a tool message any other way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: text.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: text.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// An assistant message with text, tool calls, or both — an agent
    /// turn with only tool calls still gets one of these with an empty
    /// `content` string.
    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
        }
    }

    /// A tool-result message answering `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: None,
        }
    }
}

/// A tool's capability level. Used by the permission policy (`ask` mode
/// auto-approves `Read`) and by the analysis registry (`Read`-only
/// subset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    Read,
    Write,
    Execute,
}

/// Static description of a tool, as conveyed to the backend. Mirrors the
/// shape the backend expects for its `tools` request field; `input_schema`
/// is passed through verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub permission_level: PermissionLevel,
}

/// Token usage reported on the terminal chunk of a stream (or a unary
/// response), mapped from the backend's `prompt_eval_count`/`eval_count`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// One item from a `stream_chat` sequence. Lazy, finite, non-restartable:
/// a `Done` chunk marks success, an `Error` chunk marks failure, and a
/// dropped channel with neither marks cancellation.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    Text(String),
    Thinking(String),
    ToolCall(ToolCall),
    Done(Option<Usage>),
    Error(Error),
}

/// Named model tiers. `fast` classifies intent and runs simple chat;
/// `smart` executes; `genius` plans in the architect phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Fast,
    Smart,
    Genius,
}

/// Resilience parameters for the retry/backoff policy (`retry.rs`).
#[derive(Debug, Clone, Copy)]
pub struct ResilienceConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Agent-level parameters distinct from backend resilience: how many
/// times the pipeline orchestrator retries a failed step, and whether the
/// verifier runs at all.
#[derive(Debug, Clone, Copy)]
pub struct AgentConfig {
    pub max_retries: u32,
    pub verification_enabled: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            verification_enabled: true,
        }
    }
}

/// Fully resolved configuration the core receives. Loading this from
/// files/environment is explicitly out of scope (SPEC_FULL.md §1); the
/// core only ever consumes an already-built value.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub model_fast: String,
    pub model_smart: String,
    pub model_genius: String,
    pub keep_alive: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub num_thread: Option<u32>,
    pub context_window: u32,
    pub context_window_fast: u32,
    pub context_window_genius: u32,
    pub auto_compact_threshold: f32,
    pub warn_threshold: f32,
    pub preserve_last: usize,
    pub enable_auto_compact: bool,
    pub agent: AgentConfig,
    pub resilience: ResilienceConfig,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn model_for(&self, tier: Tier) -> &str {
        match tier {
            Tier::Fast => &self.model_fast,
            Tier::Smart => &self.model_smart,
            Tier::Genius => &self.model_genius,
        }
    }

    /// Context window for `tier`'s model. Different tiers commonly back
    /// onto different models with different windows (e.g. a 32K fast
    /// model vs. a 128K genius model); callers that switch tiers (the
    /// architect/editor flow, §4.10) resync against this after the
    /// switch so usage thresholds stay meaningful.
    pub fn context_window_for(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Fast => self.context_window_fast,
            Tier::Smart => self.context_window,
            Tier::Genius => self.context_window_genius,
        }
    }
}

/// Builder for [`Config`], following the same all-`Option<T>`-fields,
/// fluent-setter, validating-`build()` shape used for `AgentOptions` in
/// the sibling SDK this crate grew from.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    base_url: Option<String>,
    model_fast: Option<String>,
    model_smart: Option<String>,
    model_genius: Option<String>,
    keep_alive: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    num_thread: Option<u32>,
    context_window: Option<u32>,
    context_window_fast: Option<u32>,
    context_window_genius: Option<u32>,
    auto_compact_threshold: Option<f32>,
    warn_threshold: Option<f32>,
    preserve_last: Option<usize>,
    enable_auto_compact: Option<bool>,
    agent: Option<AgentConfig>,
    resilience: Option<ResilienceConfig>,
}

impl ConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn model_fast(mut self, model: impl Into<String>) -> Self {
        self.model_fast = Some(model.into());
        self
    }

    pub fn model_smart(mut self, model: impl Into<String>) -> Self {
        self.model_smart = Some(model.into());
        self
    }

    pub fn model_genius(mut self, model: impl Into<String>) -> Self {
        self.model_genius = Some(model.into());
        self
    }

    pub fn keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = Some(keep_alive.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn num_thread(mut self, num_thread: u32) -> Self {
        self.num_thread = Some(num_thread);
        self
    }

    pub fn context_window(mut self, window: u32) -> Self {
        self.context_window = Some(window);
        self
    }

    pub fn context_window_fast(mut self, window: u32) -> Self {
        self.context_window_fast = Some(window);
        self
    }

    pub fn context_window_genius(mut self, window: u32) -> Self {
        self.context_window_genius = Some(window);
        self
    }

    pub fn auto_compact_threshold(mut self, v: f32) -> Self {
        self.auto_compact_threshold = Some(v);
        self
    }

    pub fn warn_threshold(mut self, v: f32) -> Self {
        self.warn_threshold = Some(v);
        self
    }

    pub fn preserve_last(mut self, n: usize) -> Self {
        self.preserve_last = Some(n);
        self
    }

    pub fn enable_auto_compact(mut self, enabled: bool) -> Self {
        self.enable_auto_compact = Some(enabled);
        self
    }

    pub fn agent(mut self, agent: AgentConfig) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn resilience(mut self, resilience: ResilienceConfig) -> Self {
        self.resilience = Some(resilience);
        self
    }

    pub fn build(self) -> crate::error::Result<Config> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::config_load_failed("base_url is required"))?;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::config_load_failed("base_url must start with http:// or https://"));
        }
        let model_smart = self
            .model_smart
            .ok_or_else(|| Error::config_load_failed("model_smart is required"))?;
        let temperature = self.temperature.unwrap_or(0.7);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(Error::config_load_failed("temperature must be between 0.0 and 2.0"));
        }

        Ok(Config {
            model_fast: self.model_fast.unwrap_or_else(|| model_smart.clone()),
            model_genius: self.model_genius.unwrap_or_else(|| model_smart.clone()),
            base_url,
            model_smart,
            keep_alive: self.keep_alive.unwrap_or_else(|| "5m".to_string()),
            temperature,
            max_tokens: self.max_tokens,
            num_thread: self.num_thread,
            context_window: self.context_window.unwrap_or(32_000),
            context_window_fast: self.context_window_fast.unwrap_or(32_000),
            context_window_genius: self.context_window_genius.unwrap_or(128_000),
            auto_compact_threshold: self.auto_compact_threshold.unwrap_or(0.85),
            warn_threshold: self.warn_threshold.unwrap_or(0.7),
            preserve_last: self.preserve_last.unwrap_or(4),
            enable_auto_compact: self.enable_auto_compact.unwrap_or(true),
            agent: self.agent.unwrap_or_default(),
            resilience: self.resilience.unwrap_or_default(),
        })
    }
}

/// Derived snapshot of context usage, computed lazily and cached until
/// the next mutation (`context.rs`).
#[derive(Debug, Clone, Copy)]
pub struct ContextStats {
    pub used_tokens: usize,
    pub context_window: usize,
    pub usage_percent: f32,
    pub message_count: usize,
    pub needs_compaction: bool,
    pub needs_warning: bool,
}

// -- multi-agent pipeline types --

/// Coarse classification of a task, produced by the router (I).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    SimpleChat,
    Code,
    Analysis,
    Planning,
    Search,
    Memory,
    Other,
}

impl Intent {
    /// Parses a fast-tier classification response. Anything unrecognized
    /// collapses to `Other` rather than erroring.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "simple_chat" => Intent::SimpleChat,
            "code" => Intent::Code,
            "analysis" => Intent::Analysis,
            "planning" => Intent::Planning,
            "search" => Intent::Search,
            "memory" => Intent::Memory,
            _ => Intent::Other,
        }
    }

    /// Whether this intent should route through the planner/executor/
    /// verifier pipeline rather than a single direct-task turn.
    pub fn should_use_multi_agent(self) -> bool {
        matches!(self, Intent::Code | Intent::Planning | Intent::Analysis)
    }
}

/// One step of a [`StructuredPlan`].
#[derive(Debug, Clone)]
pub struct Step {
    pub id: String,
    pub description: String,
    pub done: bool,
    pub depends_on: Vec<String>,
}

impl Step {
    pub fn new(id: impl Into<String>, description: impl Into<String>, depends_on: Vec<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            done: false,
            depends_on,
        }
    }
}

/// An ordered plan produced by the planner agent (J).
#[derive(Debug, Clone, Default)]
pub struct StructuredPlan {
    pub steps: Vec<Step>,
}

impl StructuredPlan {
    /// Steps whose dependencies are all already done and that are not
    /// themselves done, in plan order.
    pub fn ready_steps(&self) -> Vec<&Step> {
        self.steps
            .iter()
            .filter(|s| !s.done)
            .filter(|s| {
                s.depends_on.iter().all(|dep| {
                    self.steps.iter().any(|other| other.id == *dep && other.done)
                })
            })
            .collect()
    }

    pub fn all_done(&self) -> bool {
        self.steps.iter().all(|s| s.done)
    }
}

/// Outcome of running a single step (or a direct task) through the
/// executor agent (K).
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    pub tool_calls: Vec<ToolCall>,
    pub error: Option<Error>,
}

/// Outcome of the verifier agent (L).
#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub summary: String,
    pub passed: bool,
}

/// Aggregate result of the pipeline orchestrator (M).
#[derive(Debug, Clone, Default)]
pub struct PipelineResult {
    pub plan: Option<StructuredPlan>,
    pub executions: Vec<ExecutionResult>,
    pub verification: Option<VerificationResult>,
    pub errors: Vec<Error>,
    pub output: String,
}

/// A cached authorization decision keyed by tool name (the permission
/// policy's "always"/"never" memo, D).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachedDecision {
    AlwaysAllow,
    NeverAllow,
}
