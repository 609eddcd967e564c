//! Parallel tool executor (E): runs one assistant turn's tool calls
//! concurrently under a global concurrency cap, preserving call order in
//! the returned results regardless of completion order.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::cancel::CancellationToken;
use crate::permission::{Decision, PermissionPolicy};
use crate::sink::{OutputSink, PermissionInput, SinkEvent};
use crate::tools::ToolRegistry;
use crate::types::ToolCall;

const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Tools in this allowlist are treated as "write" calls by the agent loop
/// (§4.9) — e.g. to require extra confirmation or skip auto-compaction
/// mid-turn.
const WRITE_TOOL_NAMES: &[&str] = &["write_file", "edit_file", "delete_file"];

pub fn is_write_tool(name: &str) -> bool {
    WRITE_TOOL_NAMES.contains(&name)
}

/// Outcome of dispatching one tool call.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub name: String,
    pub tool_call_id: String,
    pub text: String,
    pub is_error: bool,
}

/// Bounded-concurrency executor for a batch of tool calls from one
/// assistant turn.
pub struct ParallelExecutor {
    max_concurrency: usize,
}

impl ParallelExecutor {
    /// `max_concurrency <= 0` falls back to the default of 4.
    pub fn new(max_concurrency: i64) -> Self {
        let max_concurrency = if max_concurrency <= 0 {
            DEFAULT_MAX_CONCURRENCY
        } else {
            max_concurrency as usize
        };
        Self { max_concurrency }
    }

    /// Executes every call in `calls` concurrently (bounded by
    /// `max_concurrency`), gating each on the permission policy first.
    /// Results come back in the same order as `calls`; one tool's failure
    /// never cancels the others — only `cancel` being tripped does.
    pub async fn execute_all(
        &self,
        cancel: &CancellationToken,
        registry: &ToolRegistry,
        policy: &PermissionPolicy,
        sink: &(dyn OutputSink + Sync),
        input: &(dyn PermissionInput + Sync),
        calls: &[ToolCall],
    ) -> Vec<ToolResult> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut slots: Vec<Option<ToolResult>> = vec![None; calls.len()];

        let futures = calls.iter().enumerate().map(|(idx, call)| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return (idx, self.cancelled_result(call)),
                    permit = semaphore.acquire() => permit.expect("semaphore never closed"),
                };

                sink.send(SinkEvent::ToolCall {
                    name: call.name.clone(),
                    input: serde_json::Value::Object(call.input.clone()),
                });

                let level = registry
                    .get(&call.name)
                    .map(|t| t.permission_level())
                    .unwrap_or(crate::types::PermissionLevel::Execute);
                let decision = policy
                    .check(&call.name, level, &format!("invoke {}", call.name), sink, input)
                    .await;

                let result = if decision == Decision::Deny {
                    ToolResult {
                        name: call.name.clone(),
                        tool_call_id: call.id.clone(),
                        text: "Permission denied".to_string(),
                        is_error: true,
                    }
                } else {
                    match registry.execute(cancel, call).await {
                        Ok(text) => ToolResult {
                            name: call.name.clone(),
                            tool_call_id: call.id.clone(),
                            text,
                            is_error: false,
                        },
                        Err(e) => ToolResult {
                            name: call.name.clone(),
                            tool_call_id: call.id.clone(),
                            text: e.user_message().to_string(),
                            is_error: true,
                        },
                    }
                };

                sink.send(SinkEvent::ToolResult {
                    name: result.name.clone(),
                    text: result.text.clone(),
                    is_error: result.is_error,
                });

                (idx, result)
            }
        });

        let results = futures::future::join_all(futures).await;
        for (idx, result) in results {
            slots[idx] = Some(result);
        }
        slots.into_iter().map(|s| s.expect("every slot filled")).collect()
    }

    fn cancelled_result(&self, call: &ToolCall) -> ToolResult {
        ToolResult {
            name: call.name.clone(),
            tool_call_id: call.id.clone(),
            text: "cancelled".to_string(),
            is_error: true,
        }
    }
}
