//! # Open Agent Core
//!
//! The runtime core of a terminal-based AI coding assistant: an agent
//! loop that drives a local LLM backend through tool execution and
//! context management. Built for Ollama-compatible inference servers
//! running on the same machine as the assistant.
//!
//! ## What this crate is
//!
//! Four subsystems, each with its own module:
//!
//! 1. **Agent loop and multi-agent pipeline** ([`agent_loop`], [`pipeline`],
//!    [`agents`], [`architect`]) — turn-by-turn orchestration between the
//!    model and tools, a two-phase architect→editor flow for complex
//!    changes, and a planner→executor→verifier pipeline for multi-step
//!    tasks.
//! 2. **Tool registry, permission policy, and parallel executor**
//!    ([`tools`], [`permission`], [`executor`], [`selector`]) —
//!    capability-typed tool dispatch, interactive authorization with
//!    memoized decisions, and bounded-concurrency parallel execution that
//!    preserves call order.
//! 3. **Model-backend client with resilience** ([`client`], [`resilient`],
//!    [`retry`], [`stream`]) — a streaming HTTP client wrapped by a
//!    circuit breaker and retry policy, with fast/smart/genius model
//!    tiers.
//! 4. **Context manager and compactor** ([`context`], [`compactor`]) —
//!    conversation message store with token accounting, threshold-driven
//!    automatic summarization, and masking of stale tool outputs.
//!
//! What this crate deliberately does NOT do: load configuration from
//! files or environment (callers hand in an already-resolved [`Config`]),
//! render a terminal UI (callers implement [`sink::OutputSink`] and
//! [`sink::PermissionInput`]), sandbox shell tools, or read skills/memory
//! files off disk (callers implement [`memory::MemorySource`]).
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use open_agent_core::{
//!     agent_loop::AgentLoop, cancel::CancellationToken, client::Client,
//!     context::ContextManager, executor::ParallelExecutor, permission::{Mode, PermissionPolicy},
//!     resilient::ResilientClient, retry::RetryConfig, sink::NullSink, tools::ToolRegistry,
//!     types::Config,
//! };
//!
//! # struct StdinInput;
//! # impl open_agent_core::sink::PermissionInput for StdinInput {
//! #     fn read_line(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = String> + Send + '_>> {
//! #         Box::pin(async { "y".to_string() })
//! #     }
//! # }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::builder()
//!         .base_url("http://localhost:11434")
//!         .model_smart("qwen2.5-coder:14b")
//!         .build()?;
//!     let config = Arc::new(config);
//!
//!     let client = Client::new(config.clone())?;
//!     let backend = ResilientClient::new(client, RetryConfig::default());
//!
//!     let registry = ToolRegistry::new();
//!     let policy = PermissionPolicy::new(Mode::Ask);
//!     let context = ContextManager::new(config.context_window, config.auto_compact_threshold, config.warn_threshold);
//!     let executor = ParallelExecutor::new(4);
//!     let input = StdinInput;
//!     let cancel = CancellationToken::new();
//!
//!     let agent_loop = AgentLoop::new(
//!         &backend, &registry, &policy, &context, &executor, &NullSink, &input,
//!         "You are a helpful coding assistant.", config.preserve_last,
//!     );
//!     let outcome = agent_loop.run_task(&cancel, "what files are in this project?").await?;
//!     println!("{}", outcome.text);
//!     Ok(())
//! }
//! ```

pub mod agent_loop;
pub mod agents;
pub mod architect;
pub mod cancel;
pub mod client;
pub mod compactor;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod memory;
pub mod permission;
pub mod pipeline;
pub mod resilient;
pub mod retry;
pub mod router;
pub mod selector;
pub mod sink;
pub mod stream;
pub mod tools;
pub mod types;

// Re-exports of the types a caller reaches for most often, so simple
// integrations don't need to spell out every submodule path.

pub use client::{ChatBackend, Client};
pub use error::{Error, Result};
pub use permission::{Mode, PermissionPolicy};
pub use resilient::ResilientClient;
pub use tools::{Tool, ToolBuilder, ToolRegistry, tool};
pub use types::{Config, Message, MessageRole, Tier};

/// Convenience module re-exporting the pieces most callers wire up to
/// build an agent loop: the backend client, tool registry, permission
/// policy, context manager, parallel executor, and the core's own
/// `Error`/`Result`. Import with `use open_agent_core::prelude::*;`.
pub mod prelude {
    pub use crate::agent_loop::{AgentLoop, AgentLoopOutcome};
    pub use crate::cancel::CancellationToken;
    pub use crate::client::{ChatBackend, Client};
    pub use crate::context::ContextManager;
    pub use crate::error::{Error, Result};
    pub use crate::executor::ParallelExecutor;
    pub use crate::permission::{Mode, PermissionPolicy};
    pub use crate::resilient::ResilientClient;
    pub use crate::sink::{NullSink, OutputSink, PermissionInput, SinkEvent};
    pub use crate::tools::{Tool, ToolRegistry, tool};
    pub use crate::types::{Config, Message, Tier};
}
