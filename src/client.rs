//! Backend client (A): streaming and unary chat against a local Ollama-
//! compatible `/api/chat` endpoint, plus health checks and tier-aware
//! model selection.
//!
//! Structurally this is the direct descendant of the teacher's
//! `Client`/`query()` pair in the original SDK — a shared `reqwest::Client`
//! transport, a model field guarded for concurrent access, and a stream
//! built by posting a JSON body and parsing the response as it arrives.
//! The wire protocol itself (Ollama NDJSON vs. OpenAI SSE) and the
//! addition of tiers are new.

use std::pin::Pin;
use std::sync::{Arc, RwLock};

use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;

use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::stream::{parse_ndjson_stream, parse_unary_response};
use crate::types::{Config, Message, MessageRole, StreamChunk, Tier, ToolCall, ToolDefinition, Usage};

/// The contract spec.md §4.1 gives a "backend client": unary and streaming
/// chat, tier get/set, a health check, and a no-op-or-not `close`. Object
/// safety (via `async_trait`) lets the agent loop, router, and the three
/// pipeline agents hold `&dyn ChatBackend` instead of a concrete
/// [`crate::resilient::ResilientClient`] — the same capability-typed
/// dispatch spec.md §9 asks for on the tool registry, applied here so
/// tests can exercise those callers against a fake backend with no
/// network involved.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(
        &self,
        cancel: &CancellationToken,
        messages: &[Message],
        tools: &[ToolDefinition],
        system_prompt: &str,
    ) -> Result<(String, Vec<ToolCall>, Option<Usage>)>;

    async fn stream_chat(
        &self,
        cancel: CancellationToken,
        messages: &[Message],
        tools: &[ToolDefinition],
        system_prompt: &str,
    ) -> Result<Pin<Box<dyn Stream<Item = StreamChunk> + Send>>>;

    fn tier(&self) -> Tier;
    fn set_tier(&self, tier: Tier);
    fn temperature(&self) -> f32;
    fn set_temperature(&self, temperature: f32);
    fn context_window(&self) -> u32;
    async fn check_health(&self, cancel: &CancellationToken) -> Result<()>;
}

fn role_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    }
}

#[derive(Serialize)]
struct WireFunctionOut {
    name: String,
    arguments: Value,
}

#[derive(Serialize)]
struct WireToolCallOut {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: WireFunctionOut,
}

#[derive(Serialize)]
struct WireMessageOut {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCallOut>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize)]
struct WireOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    num_ctx: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_thread: Option<u32>,
}

#[derive(Serialize)]
struct WireToolFunctionDef {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Serialize)]
struct WireToolDef {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireToolFunctionDef,
}

#[derive(Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessageOut>,
    stream: bool,
    keep_alive: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireToolDef>>,
    options: WireOptions,
}

/// A streaming/unary chat client against the backend's `/api/chat`.
///
/// Cloning via [`Client::fork`] shares the underlying HTTP transport but
/// gives the fork an independent `tier` field, so the architect/editor
/// flow (`architect.rs`) can run a genius-tier sub-agent and a smart-tier
/// sub-agent concurrently without one's tier switch affecting the other
/// (SPEC_FULL.md §9, "two-tier client sharing").
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    config: Arc<Config>,
    tier: Arc<RwLock<Tier>>,
    temperature: Arc<RwLock<f32>>,
}

impl Client {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(Error::from)?;
        let temperature = config.temperature;
        Ok(Self {
            http,
            base_url: crate::config::normalize_base_url(&config.base_url),
            config,
            tier: Arc::new(RwLock::new(Tier::Smart)),
            temperature: Arc::new(RwLock::new(temperature)),
        })
    }

    /// Creates a lightweight clone sharing this client's HTTP transport
    /// and config but with its own tier and temperature fields. The
    /// fork's `close()` is a no-op (the parent owns the transport's
    /// lifetime).
    pub fn fork(&self) -> Self {
        let tier = *self.tier.read().expect("tier lock poisoned");
        let temperature = *self.temperature.read().expect("temperature lock poisoned");
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            config: self.config.clone(),
            tier: Arc::new(RwLock::new(tier)),
            temperature: Arc::new(RwLock::new(temperature)),
        }
    }

    /// Thread-safe single-field update. Does not affect requests already
    /// in flight: each request snapshots the tier under the lock before
    /// building its body.
    pub fn set_tier(&self, tier: Tier) {
        *self.tier.write().expect("tier lock poisoned") = tier;
    }

    pub fn tier(&self) -> Tier {
        *self.tier.read().expect("tier lock poisoned")
    }

    /// Thread-safe single-field update, same discipline as [`Client::set_tier`] —
    /// the architect/editor flow (`architect.rs`) swaps this alongside the
    /// tier when it switches phases, then restores it on exit.
    pub fn set_temperature(&self, temperature: f32) {
        *self.temperature.write().expect("temperature lock poisoned") = temperature;
    }

    pub fn temperature(&self) -> f32 {
        *self.temperature.read().expect("temperature lock poisoned")
    }

    /// The context window for the currently active tier's model. Callers
    /// that switch tiers should re-sync the context manager's window
    /// immediately after (SPEC_FULL.md §4.10).
    pub fn context_window(&self) -> u32 {
        self.config.context_window_for(self.tier())
    }

    /// No-op: the fork that owns the transport is responsible for its
    /// lifetime; this exists so callers can treat every client uniformly.
    pub fn close(&self) {}

    fn model_snapshot(&self) -> String {
        let tier = self.tier();
        self.config.model_for(tier).to_string()
    }

    fn build_request(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        system_prompt: &str,
        stream: bool,
    ) -> WireRequest {
        let mut wire_messages = Vec::with_capacity(messages.len() + 1);
        if !system_prompt.is_empty() {
            wire_messages.push(WireMessageOut {
                role: "system".to_string(),
                content: system_prompt.to_string(),
                tool_calls: None,
                tool_call_id: None,
            });
        }
        for m in messages {
            let tool_calls = m.tool_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .map(|c| WireToolCallOut {
                        id: c.id.clone(),
                        call_type: "function".to_string(),
                        function: WireFunctionOut {
                            name: c.name.clone(),
                            arguments: Value::Object(c.input.clone()),
                        },
                    })
                    .collect()
            });
            wire_messages.push(WireMessageOut {
                role: role_str(m.role).to_string(),
                content: m.content.clone(),
                tool_calls,
                tool_call_id: m.tool_call_id.clone(),
            });
        }

        let tools = if tools.is_empty() {
            None
        } else {
            Some(
                tools
                    .iter()
                    .map(|t| WireToolDef {
                        kind: "function",
                        function: WireToolFunctionDef {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.input_schema.clone(),
                        },
                    })
                    .collect(),
            )
        };

        WireRequest {
            model: self.model_snapshot(),
            messages: wire_messages,
            stream,
            keep_alive: self.config.keep_alive.clone(),
            tools,
            options: WireOptions {
                temperature: self.temperature(),
                num_predict: self.config.max_tokens,
                num_ctx: self.context_window(),
                num_thread: self.config.num_thread,
            },
        }
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if status.as_u16() == 404 || body.to_lowercase().contains("model not found") {
            Err(Error::llm_model_not_found(body))
        } else {
            Err(Error::llm_request_failed(format!("{status}: {body}")))
        }
    }

    /// `GET {base_url}/api/version`.
    pub async fn check_health(&self, cancel: &CancellationToken) -> Result<()> {
        let url = format!("{}/api/version", self.base_url);
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::cancelled()),
            res = self.http.get(&url).send() => {
                match res {
                    Ok(resp) if resp.status().is_success() => Ok(()),
                    Ok(_) => Err(Error::llm_unavailable("health check returned a non-2xx status")),
                    Err(e) => Err(Error::llm_unavailable(format!("health check failed: {e}"))),
                }
            }
        }
    }

    /// Unary chat: a single request/response round trip, retried by the
    /// resilient wrapper (`resilient.rs`) on retryable errors.
    pub async fn chat(
        &self,
        cancel: &CancellationToken,
        messages: &[Message],
        tools: &[ToolDefinition],
        system_prompt: &str,
    ) -> Result<(String, Vec<ToolCall>, Option<Usage>)> {
        let body = self.build_request(messages, tools, system_prompt, false);
        let url = format!("{}/api/chat", self.base_url);
        let resp = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::cancelled()),
            res = self.http.post(&url).json(&body).send() => res?,
        };
        let resp = Self::check_status(resp).await?;
        let text = resp.text().await?;
        parse_unary_response(&text)
    }

    /// Streaming chat: lazy, finite, non-restartable. Cancellation closes
    /// the stream without a terminal `done` chunk and without surfacing
    /// an error — the returned stream simply ends.
    pub async fn stream_chat(
        &self,
        cancel: CancellationToken,
        messages: &[Message],
        tools: &[ToolDefinition],
        system_prompt: &str,
    ) -> Result<Pin<Box<dyn Stream<Item = StreamChunk> + Send>>> {
        let body = self.build_request(messages, tools, system_prompt, true);
        let url = format!("{}/api/chat", self.base_url);
        let resp = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::cancelled()),
            res = self.http.post(&url).json(&body).send() => res?,
        };
        let resp = Self::check_status(resp).await?;
        let chunks = parse_ndjson_stream(resp);

        let cancel_for_stream = cancel;
        let gated = futures::stream::unfold(
            (chunks, cancel_for_stream),
            move |(mut chunks, cancel)| async move {
                if cancel.is_cancelled() {
                    return None;
                }
                tokio::select! {
                    _ = cancel.cancelled() => None,
                    next = chunks.next() => {
                        match next {
                            Some(Ok(chunk)) => Some((chunk, (chunks, cancel))),
                            Some(Err(e)) => Some((StreamChunk::Error(e), (chunks, cancel))),
                            None => None,
                        }
                    }
                }
            },
        );

        Ok(Box::pin(gated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn test_config() -> Arc<Config> {
        Arc::new(
            Config::builder()
                .base_url("http://localhost:11434")
                .model_fast("qwen3:1.7b")
                .model_smart("qwen3:8b")
                .model_genius("qwen3:32b")
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn new_client_defaults_to_smart_tier() {
        let client = Client::new(test_config()).unwrap();
        assert_eq!(client.tier(), Tier::Smart);
    }

    #[test]
    fn set_tier_is_visible_immediately() {
        let client = Client::new(test_config()).unwrap();
        client.set_tier(Tier::Genius);
        assert_eq!(client.tier(), Tier::Genius);
        assert_eq!(client.model_snapshot(), "qwen3:32b");
    }

    #[test]
    fn fork_has_independent_tier_sharing_transport() {
        let client = Client::new(test_config()).unwrap();
        client.set_tier(Tier::Genius);
        let fork = client.fork();
        assert_eq!(fork.tier(), Tier::Genius);

        fork.set_tier(Tier::Fast);
        assert_eq!(fork.tier(), Tier::Fast);
        assert_eq!(client.tier(), Tier::Genius, "parent tier must be unaffected by fork's tier change");
    }

    #[test]
    fn build_request_carries_tool_call_linkage() {
        let client = Client::new(test_config()).unwrap();
        let tool_call = ToolCall::new("c1", "read_file", {
            let mut m = serde_json::Map::new();
            m.insert("path".to_string(), Value::String("a.txt".to_string()));
            m
        });
        let messages = vec![
            Message::assistant("", vec![tool_call]),
            Message::tool_result("c1", "file contents"),
        ];
        let body = client.build_request(&messages, &[], "system", true);
        assert_eq!(body.messages[0].role, "assistant");
        assert_eq!(body.messages[0].tool_calls.as_ref().unwrap()[0].id, "c1");
        assert_eq!(body.messages[1].tool_call_id.as_deref(), Some("c1"));
    }
}
