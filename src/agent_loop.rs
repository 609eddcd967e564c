//! Agent loop (N): the core runtime turn-by-turn loop driving the model
//! through tool calls until it produces a final answer.
//!
//! The direct generalization of the teacher's `Client::auto_execute_loop`/
//! `send`/`receive` structure (`client.rs`) — same repeat-until-no-more-
//! tool-calls shape — reworked around the registry/policy/executor/context
//! abstractions this crate built instead of an inline tool `Vec` and a hook
//! system.

use futures::StreamExt;

use crate::cancel::CancellationToken;
use crate::client::ChatBackend;
use crate::context::{mask_old_tool_results, ContextManager};
use crate::error::{Error, Result};
use crate::executor::ParallelExecutor;
use crate::permission::PermissionPolicy;
use crate::sink::{OutputSink, PermissionInput, SinkEvent};
use crate::tools::ToolRegistry;
use crate::types::{Message, StreamChunk, Usage};

const DEFAULT_MAX_ITERATIONS: usize = 25;

/// Outcome of a finished loop: the assistant's final text and whatever
/// usage the last turn reported.
#[derive(Debug, Clone)]
pub struct AgentLoopOutcome {
    pub text: String,
    pub usage: Option<Usage>,
    pub iterations: usize,
}

/// Bundles everything one turn-by-turn run needs: a model client, the
/// (already-selected) tool registry, the permission gate, the shared
/// context, the parallel dispatcher, and the UI's sink/input channels.
pub struct AgentLoop<'a> {
    backend: &'a dyn ChatBackend,
    registry: &'a ToolRegistry,
    policy: &'a PermissionPolicy,
    context: &'a ContextManager,
    executor: &'a ParallelExecutor,
    sink: &'a (dyn OutputSink + Sync),
    input: &'a (dyn PermissionInput + Sync),
    system_prompt: String,
    preserve_last: usize,
    max_iterations: usize,
}

impl<'a> AgentLoop<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: &'a dyn ChatBackend,
        registry: &'a ToolRegistry,
        policy: &'a PermissionPolicy,
        context: &'a ContextManager,
        executor: &'a ParallelExecutor,
        sink: &'a (dyn OutputSink + Sync),
        input: &'a (dyn PermissionInput + Sync),
        system_prompt: impl Into<String>,
        preserve_last: usize,
    ) -> Self {
        Self {
            backend,
            registry,
            policy,
            context,
            executor,
            sink,
            input,
            system_prompt: system_prompt.into(),
            preserve_last,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Pre-seeds the conversation with a user-role message carrying `task`
    /// and runs the loop to completion.
    pub async fn run_task(&self, cancel: &CancellationToken, task: impl Into<String>) -> Result<AgentLoopOutcome> {
        self.context.append(Message::user(task));
        self.run(cancel).await
    }

    /// Runs the loop against whatever is already in `context`.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<AgentLoopOutcome> {
        let tool_defs = self.registry.get_definitions();

        for iteration in 0..self.max_iterations {
            if cancel.is_cancelled() {
                return Err(Error::cancelled());
            }

            let masked = mask_old_tool_results(&self.context.messages(), self.preserve_last);
            let mut stream = self
                .backend
                .stream_chat(cancel.clone(), &masked, &tool_defs, &self.system_prompt)
                .await?;

            let mut text_buffer = String::new();
            let mut tool_calls = Vec::new();
            let mut usage = None;
            let mut turn_error = None;
            let mut stream_closed_clean = false;

            loop {
                let chunk = tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(Error::cancelled());
                    }
                    chunk = stream.next() => chunk,
                };

                match chunk {
                    Some(StreamChunk::Text(text)) => {
                        text_buffer.push_str(&text);
                        self.sink.send(SinkEvent::Text(text));
                    }
                    Some(StreamChunk::Thinking(text)) => {
                        self.sink.send(SinkEvent::Thinking(text));
                    }
                    Some(StreamChunk::ToolCall(call)) => {
                        tool_calls.push(call);
                    }
                    Some(StreamChunk::Done(u)) => {
                        usage = u;
                        break;
                    }
                    Some(StreamChunk::Error(e)) => {
                        turn_error = Some(e);
                        break;
                    }
                    None => {
                        stream_closed_clean = true;
                        break;
                    }
                }
            }

            if let Some(e) = turn_error {
                // Partial text/tool-calls from a failed turn are never
                // committed (spec.md §7's partial-failure semantics).
                return Err(e);
            }
            if stream_closed_clean {
                return Err(Error::cancelled());
            }

            if !text_buffer.is_empty() || !tool_calls.is_empty() {
                self.context.append(Message::assistant(text_buffer.clone(), tool_calls.clone()));
            }

            if tool_calls.is_empty() {
                return Ok(AgentLoopOutcome {
                    text: text_buffer,
                    usage,
                    iterations: iteration + 1,
                });
            }

            let results = self
                .executor
                .execute_all(cancel, self.registry, self.policy, self.sink, self.input, &tool_calls)
                .await;

            // Tool-result messages are appended in the same order as the
            // calls they answer, regardless of completion order — the
            // executor already guarantees that ordering in its output.
            for result in &results {
                self.context.append(Message::tool_result(result.tool_call_id.clone(), result.text.clone()));
            }

            self.sink.send(SinkEvent::ContextStats(self.context.get_stats()));
        }

        Err(Error::max_iterations_reached(self.max_iterations))
    }
}
