//! Executor agent (K): runs a single plan step (or a direct task, when the
//! orchestrator takes the single-agent path) through the full agent loop
//! (A/B/C/D/E via `AgentLoop`), then reports what happened as an
//! [`ExecutionResult`].
//!
//! This is a thin wrapper — all the turn-by-turn machinery lives in
//! `agent_loop.rs`. What this module adds is collecting the tool calls the
//! step issued, so the orchestrator can extract `write_file`/`edit_file`
//! targets for the verifier (§4.8d) without the agent loop itself needing
//! to know anything about verification.

use crate::agent_loop::AgentLoop;
use crate::cancel::CancellationToken;
use crate::context::ContextManager;
use crate::types::{ExecutionResult, MessageRole, ToolCall};

/// Runs `task_description` to completion and collects every tool call
/// issued along the way (from the newly appended assistant messages),
/// regardless of whether the run ultimately succeeded.
pub async fn execute(
    agent_loop: &AgentLoop<'_>,
    context: &ContextManager,
    cancel: &CancellationToken,
    task_description: &str,
) -> ExecutionResult {
    let start_index = context.messages().len();
    let outcome = agent_loop.run_task(cancel, task_description).await;
    let tool_calls = collect_tool_calls(&context.messages()[start_index..]);

    match outcome {
        Ok(o) => ExecutionResult {
            success: true,
            output: o.text,
            tool_calls,
            error: None,
        },
        Err(e) => ExecutionResult {
            success: false,
            output: String::new(),
            tool_calls,
            error: Some(e),
        },
    }
}

fn collect_tool_calls(messages: &[crate::types::Message]) -> Vec<ToolCall> {
    messages
        .iter()
        .filter(|m| m.role == MessageRole::Assistant)
        .filter_map(|m| m.tool_calls.as_ref())
        .flatten()
        .cloned()
        .collect()
}
