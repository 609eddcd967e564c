//! Output sink and permission input: the two interfaces the terminal UI
//! plugs in (SPEC_FULL.md §6). Neither is implemented here — the core only
//! consumes them, the same way the teacher's `hooks.rs` only consumes
//! `Arc<dyn Fn(...) -> Pin<Box<dyn Future<...>>> + Send + Sync>` handlers
//! without caring what the application does inside one.

use std::future::Future;
use std::pin::Pin;

use crate::types::{ContextStats, PermissionLevel, Usage};

/// One typed event the core reports to the UI. `Done` marks normal
/// completion of an agent turn; sinks see no further events until the
/// next turn begins.
#[derive(Debug, Clone)]
pub enum SinkEvent {
    Text(String),
    Thinking(String),
    ToolCall { name: String, input: serde_json::Value },
    ToolResult { name: String, text: String, is_error: bool },
    Info(String),
    Warning(String),
    Success(String),
    Error(String),
    Activity(String),
    Stats { iteration: usize, tokens: Usage, elapsed: std::time::Duration },
    RateLimit { delay: std::time::Duration, reason: String, attempt: u32, max: u32 },
    ContextStats(ContextStats),
    PermissionPrompt { tool: String, level: PermissionLevel, description: String },
    Plan(String),
    PlanUpdate(String),
    Done,
}

/// Receives [`SinkEvent`]s from the agent loop and any background task it
/// spawns. Implementations must tolerate concurrent `send` calls — the
/// parallel executor (E) reports tool results from multiple tasks at once.
pub trait OutputSink: Send + Sync {
    fn send(&self, event: SinkEvent);
}

/// A no-op sink, useful for tests and headless callers that don't need
/// progress reporting.
pub struct NullSink;

impl OutputSink for NullSink {
    fn send(&self, _event: SinkEvent) {}
}

/// Blocking permission input: yields a raw line the permission policy (D)
/// interprets as `y|n|a|v|yes|no|always|never` (anything else denies).
///
/// Modeled on the teacher's `Arc<dyn Fn(...) -> Pin<Box<dyn Future<Output =
/// ...> + Send>> + Send + Sync>` hook-handler shape (`hooks.rs`), since the
/// input function is itself async (it waits on a terminal read) and must be
/// object-safe to store behind a trait object.
pub trait PermissionInput: Send + Sync {
    fn read_line(&self) -> Pin<Box<dyn Future<Output = String> + Send + '_>>;
}

/// Session persistence (injected): invoked after each message append with a
/// copy of the conversation. The core never writes the conversation itself.
pub type OnSave = std::sync::Arc<dyn Fn(Vec<crate::types::Message>) + Send + Sync>;
