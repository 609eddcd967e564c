//! End-to-end exercise of the agent loop against a scripted backend: one
//! tool call, one tool result, then a final answer with no further calls.
//! Covers the round-trip shape the masking and context-stats logic further
//! downstream both depend on (scenario 1).

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use futures::Stream;
use open_agent_core::agent_loop::AgentLoop;
use open_agent_core::cancel::CancellationToken;
use open_agent_core::client::ChatBackend;
use open_agent_core::context::ContextManager;
use open_agent_core::error::Result;
use open_agent_core::executor::ParallelExecutor;
use open_agent_core::permission::{Mode, PermissionPolicy};
use open_agent_core::sink::{NullSink, PermissionInput};
use open_agent_core::tools::{tool, ToolRegistry};
use open_agent_core::types::{Message, MessageRole, StreamChunk, Tier, ToolCall, ToolDefinition, Usage};

struct AlwaysYes;
impl PermissionInput for AlwaysYes {
    fn read_line(&self) -> Pin<Box<dyn std::future::Future<Output = String> + Send + '_>> {
        Box::pin(async { "y".to_string() })
    }
}

/// First turn answers with a single `read_file` tool call, second turn
/// answers with plain text and no calls, ending the loop.
struct ScriptedBackend {
    turn: AtomicUsize,
}

#[async_trait::async_trait]
impl ChatBackend for ScriptedBackend {
    async fn chat(
        &self,
        _cancel: &CancellationToken,
        _messages: &[Message],
        _tools: &[ToolDefinition],
        _system_prompt: &str,
    ) -> Result<(String, Vec<ToolCall>, Option<Usage>)> {
        unreachable!("agent loop drives turns through stream_chat")
    }

    async fn stream_chat(
        &self,
        _cancel: CancellationToken,
        _messages: &[Message],
        _tools: &[ToolDefinition],
        _system_prompt: &str,
    ) -> Result<Pin<Box<dyn Stream<Item = StreamChunk> + Send>>> {
        let turn = self.turn.fetch_add(1, Ordering::SeqCst);
        let chunks = if turn == 0 {
            vec![
                StreamChunk::ToolCall(ToolCall::new(
                    "c1".to_string(),
                    "read_file".to_string(),
                    serde_json::Map::new(),
                )),
                StreamChunk::Done(None),
            ]
        } else {
            vec![StreamChunk::Text("done reading".to_string()), StreamChunk::Done(None)]
        };
        Ok(Box::pin(tokio_stream::iter(chunks)))
    }

    fn tier(&self) -> Tier {
        Tier::Smart
    }
    fn set_tier(&self, _tier: Tier) {}
    fn temperature(&self) -> f32 {
        0.1
    }
    fn set_temperature(&self, _temperature: f32) {}
    fn context_window(&self) -> u32 {
        32_000
    }
    async fn check_health(&self, _cancel: &CancellationToken) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn tool_call_round_trips_through_the_agent_loop_in_order() {
    let backend = ScriptedBackend { turn: AtomicUsize::new(0) };
    let mut registry = ToolRegistry::new();
    registry.register(tool("read_file", "Read a file").build(|_args| async move {
        Ok(serde_json::json!("file contents"))
    }));
    let policy = PermissionPolicy::new(Mode::Auto);
    let context = ContextManager::new(32_000, 0.85, 0.7);
    let parallel = ParallelExecutor::new(4);
    let input = AlwaysYes;
    let cancel = CancellationToken::new();

    let agent_loop = AgentLoop::new(
        &backend, &registry, &policy, &context, &parallel, &NullSink, &input,
        "system prompt", 10,
    );
    let outcome = agent_loop.run_task(&cancel, "what's in this file?").await.unwrap();

    assert_eq!(outcome.text, "done reading");
    assert_eq!(outcome.iterations, 2);

    let messages = context.messages();
    // user task, assistant(tool_calls=[c1]), tool(tool_call_id=c1), assistant(final)
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[1].role, MessageRole::Assistant);
    let tool_calls = messages[1].tool_calls.as_ref().unwrap();
    assert_eq!(tool_calls.len(), 1);
    assert_eq!(tool_calls[0].id, "c1");
    assert_eq!(messages[2].role, MessageRole::Tool);
    assert_eq!(messages[2].tool_call_id.as_deref(), Some("c1"));
    assert_eq!(messages[2].content, "file contents");
    assert_eq!(messages[3].role, MessageRole::Assistant);
    assert_eq!(messages[3].content, "done reading");
}
