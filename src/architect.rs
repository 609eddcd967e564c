//! Architect/Editor two-phase flow (O): a bounded genius-tier planning
//! loop over the read-only tool subset, followed by a smart-tier editing
//! loop with the full tool set and the plan appended as context
//! (spec.md §4.10).
//!
//! Both phases run through the same [`AgentLoop`] (N) the single-agent
//! path uses — this module only owns the tier/temperature switching
//! around it and the context-window resync spec.md §4.10 calls for.
//! Tier changes are plain `&dyn ChatBackend` calls rather than a client
//! fork: the two phases run strictly sequentially, never concurrently, so
//! there is no in-flight request on the old tier to protect.

use crate::agent_loop::{AgentLoop, AgentLoopOutcome};
use crate::cancel::CancellationToken;
use crate::client::ChatBackend;
use crate::context::ContextManager;
use crate::error::Result;
use crate::executor::ParallelExecutor;
use crate::permission::PermissionPolicy;
use crate::sink::{OutputSink, PermissionInput, SinkEvent};
use crate::tools::ToolRegistry;
use crate::types::{Message, Tier};

const PLANNING_TEMPERATURE: f32 = 0.4;
const EDITING_TEMPERATURE: f32 = 0.1;
const MAX_PLANNING_ITERATIONS: usize = 5;

const PLANNING_SYSTEM_PROMPT: &str = "You are in read-only planning mode. Investigate the codebase \
using the tools available and produce a structured change plan in natural language: what files \
need to change and how. Do not attempt to make changes yourself.";

/// Bundles the pieces the two-phase flow shares with the single-agent
/// path (`pipeline.rs`'s `Orchestrator`), plus each tier's context
/// window so the resync in `run` has something to switch to and from.
pub struct ArchitectEditor<'a> {
    backend: &'a dyn ChatBackend,
    registry: &'a ToolRegistry,
    policy: &'a PermissionPolicy,
    context: &'a ContextManager,
    parallel: &'a ParallelExecutor,
    sink: &'a (dyn OutputSink + Sync),
    input: &'a (dyn PermissionInput + Sync),
    editing_system_prompt: String,
    preserve_last: usize,
    genius_context_window: u32,
    smart_context_window: u32,
}

impl<'a> ArchitectEditor<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: &'a dyn ChatBackend,
        registry: &'a ToolRegistry,
        policy: &'a PermissionPolicy,
        context: &'a ContextManager,
        parallel: &'a ParallelExecutor,
        sink: &'a (dyn OutputSink + Sync),
        input: &'a (dyn PermissionInput + Sync),
        editing_system_prompt: impl Into<String>,
        preserve_last: usize,
        genius_context_window: u32,
        smart_context_window: u32,
    ) -> Self {
        Self {
            backend,
            registry,
            policy,
            context,
            parallel,
            sink,
            input,
            editing_system_prompt: editing_system_prompt.into(),
            preserve_last,
            genius_context_window,
            smart_context_window,
        }
    }

    /// Runs the full plan-then-edit flow for `task`. The backend's tier,
    /// temperature, and the context manager's window are always restored
    /// to whatever they were on entry, including when a phase errors or
    /// is cancelled — a failed architect run must not leave the caller's
    /// next turn pinned to the genius tier.
    pub async fn run(&self, cancel: &CancellationToken, task: &str) -> Result<AgentLoopOutcome> {
        let original_tier = self.backend.tier();
        let original_temperature = self.backend.temperature();
        let original_window = self.context.get_stats().context_window as u32;

        let outcome = match self.plan_phase(cancel, task).await {
            Ok(plan) => {
                self.sink.send(SinkEvent::Plan(plan.clone()));
                self.edit_phase(cancel, &plan).await
            }
            Err(e) => Err(e),
        };

        log::info!("architect/editor: restoring tier {original_tier:?}");
        self.backend.set_tier(original_tier);
        self.backend.set_temperature(original_temperature);
        self.context.set_context_window(original_window);

        outcome
    }

    async fn plan_phase(&self, cancel: &CancellationToken, task: &str) -> Result<String> {
        log::info!("architect/editor: tier switch -> {:?} for planning", Tier::Genius);
        self.backend.set_tier(Tier::Genius);
        self.backend.set_temperature(PLANNING_TEMPERATURE);
        self.context.set_context_window(self.genius_context_window);

        let analysis_registry = self.registry.analysis_registry();
        let agent_loop = AgentLoop::new(
            self.backend,
            &analysis_registry,
            self.policy,
            self.context,
            self.parallel,
            self.sink,
            self.input,
            PLANNING_SYSTEM_PROMPT,
            self.preserve_last,
        )
        .with_max_iterations(MAX_PLANNING_ITERATIONS);

        let outcome = agent_loop
            .run_task(cancel, format!("Produce a change plan for: {task}"))
            .await?;
        Ok(outcome.text)
    }

    async fn edit_phase(&self, cancel: &CancellationToken, plan: &str) -> Result<AgentLoopOutcome> {
        log::info!("architect/editor: tier switch -> {:?} for editing", Tier::Smart);
        self.backend.set_tier(Tier::Smart);
        self.backend.set_temperature(EDITING_TEMPERATURE);
        self.context.set_context_window(self.smart_context_window);

        self.context.append(Message::user(format!("Proposed plan:\n{plan}\n\nImplement it.")));

        let agent_loop = AgentLoop::new(
            self.backend,
            self.registry,
            self.policy,
            self.context,
            self.parallel,
            self.sink,
            self.input,
            self.editing_system_prompt.clone(),
            self.preserve_last,
        );
        agent_loop.run(cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::Mode;
    use crate::sink::NullSink;
    use crate::tools::tool;
    use crate::types::{PermissionLevel, StreamChunk, ToolCall, ToolDefinition, Usage};
    use serde_json::json;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, RwLock};

    struct NoInput;
    impl PermissionInput for NoInput {
        fn read_line(&self) -> Pin<Box<dyn std::future::Future<Output = String> + Send + '_>> {
            Box::pin(async { "y".to_string() })
        }
    }

    /// Records the tier active at the start of every `stream_chat` call,
    /// then answers with a tool call for the first `tool_call_turns` of
    /// the planning phase and plain text after that.
    struct ScriptedBackend {
        tier: RwLock<Tier>,
        temperature: RwLock<f32>,
        calls: AtomicUsize,
        tier_per_call: Mutex<Vec<Tier>>,
        plan_tool_calls: usize,
    }

    impl ScriptedBackend {
        fn new(plan_tool_calls: usize) -> Self {
            Self {
                tier: RwLock::new(Tier::Smart),
                temperature: RwLock::new(0.7),
                calls: AtomicUsize::new(0),
                tier_per_call: Mutex::new(Vec::new()),
                plan_tool_calls,
            }
        }
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
            unimplemented!("architect/editor only drives stream_chat")
        }

        async fn stream_chat(
            &self,
            _cancel: CancellationToken,
            _messages: &[Message],
            _tools: &[ToolDefinition],
            _system_prompt: &str,
        ) -> Result<Pin<Box<dyn futures::Stream<Item = StreamChunk> + Send>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.tier_per_call.lock().unwrap().push(self.tier());

            let chunks: Vec<StreamChunk> = if call < self.plan_tool_calls {
                vec![
                    StreamChunk::ToolCall(ToolCall::new(format!("c{call}"), "read_file", Default::default())),
                    StreamChunk::Done(None),
                ]
            } else if call == self.plan_tool_calls {
                vec![StreamChunk::Text("plan: touch src/lib.rs".to_string()), StreamChunk::Done(None)]
            } else {
                vec![StreamChunk::Text("implemented".to_string()), StreamChunk::Done(None)]
            };
            Ok(Box::pin(tokio_stream::iter(chunks)))
        }

        fn tier(&self) -> Tier {
            *self.tier.read().unwrap()
        }
        fn set_tier(&self, tier: Tier) {
            *self.tier.write().unwrap() = tier;
        }
        fn temperature(&self) -> f32 {
            *self.temperature.read().unwrap()
        }
        fn set_temperature(&self, temperature: f32) {
            *self.temperature.write().unwrap() = temperature;
        }
        fn context_window(&self) -> u32 {
            32_000
        }
        async fn check_health(&self, _cancel: &CancellationToken) -> Result<()> {
            Ok(())
        }
    }

    fn registry_with_read_file() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(
            tool("read_file", "reads a file")
                .permission_level(PermissionLevel::Read)
                .build(|_| async move { Ok(json!("contents")) }),
        );
        registry.register(
            tool("write_file", "writes a file")
                .permission_level(PermissionLevel::Write)
                .build(|_| async move { Ok(json!("written")) }),
        );
        registry
    }

    #[tokio::test]
    async fn plans_at_genius_tier_then_edits_at_smart_tier() {
        let backend = ScriptedBackend::new(1);
        let registry = registry_with_read_file();
        let policy = PermissionPolicy::new(Mode::Auto);
        let context = ContextManager::new(32_000, 0.85, 0.7);
        let parallel = ParallelExecutor::new(4);
        let cancel = CancellationToken::new();

        let flow = ArchitectEditor::new(
            &backend, &registry, &policy, &context, &parallel, &NullSink, &NoInput, "editor", 4, 128_000, 64_000,
        );
        let outcome = flow.run(&cancel, "add a feature").await.unwrap();

        assert_eq!(outcome.text, "implemented");

        let tiers = backend.tier_per_call.lock().unwrap().clone();
        assert_eq!(tiers, vec![Tier::Genius, Tier::Genius, Tier::Smart]);
    }

    #[tokio::test]
    async fn tier_temperature_and_context_window_restored_after_a_successful_run() {
        let backend = ScriptedBackend::new(0);
        backend.set_tier(Tier::Fast);
        backend.set_temperature(0.9);
        let registry = registry_with_read_file();
        let policy = PermissionPolicy::new(Mode::Auto);
        let context = ContextManager::new(16_000, 0.85, 0.7);
        let parallel = ParallelExecutor::new(4);
        let cancel = CancellationToken::new();

        let flow = ArchitectEditor::new(
            &backend, &registry, &policy, &context, &parallel, &NullSink, &NoInput, "editor", 4, 128_000, 64_000,
        );
        flow.run(&cancel, "add a feature").await.unwrap();

        assert_eq!(backend.tier(), Tier::Fast);
        assert_eq!(backend.temperature(), 0.9);
        assert_eq!(context.get_stats().context_window, 16_000);
    }

    #[tokio::test]
    async fn restores_tier_even_when_editing_fails() {
        struct FailingEditBackend {
            tier: RwLock<Tier>,
            planned: AtomicUsize,
        }

        #[async_trait::async_trait]
        impl ChatBackend for FailingEditBackend {
            async fn chat(
                &self,
                _cancel: &CancellationToken,
                _messages: &[Message],
                _tools: &[ToolDefinition],
                _system_prompt: &str,
            ) -> Result<(String, Vec<ToolCall>, Option<Usage>)> {
                unimplemented!()
            }

            async fn stream_chat(
                &self,
                _cancel: CancellationToken,
                _messages: &[Message],
                _tools: &[ToolDefinition],
                _system_prompt: &str,
            ) -> Result<Pin<Box<dyn futures::Stream<Item = StreamChunk> + Send>>> {
                if *self.tier.read().unwrap() == Tier::Genius {
                    self.planned.fetch_add(1, Ordering::SeqCst);
                    let chunks = vec![StreamChunk::Text("plan".to_string()), StreamChunk::Done(None)];
                    Ok(Box::pin(tokio_stream::iter(chunks)))
                } else {
                    let chunks = vec![StreamChunk::Error(crate::error::Error::llm_unavailable("down"))];
                    Ok(Box::pin(tokio_stream::iter(chunks)))
                }
            }

            fn tier(&self) -> Tier {
                *self.tier.read().unwrap()
            }
            fn set_tier(&self, tier: Tier) {
                *self.tier.write().unwrap() = tier;
            }
            fn temperature(&self) -> f32 {
                0.7
            }
            fn set_temperature(&self, _temperature: f32) {}
            fn context_window(&self) -> u32 {
                32_000
            }
            async fn check_health(&self, _cancel: &CancellationToken) -> Result<()> {
                Ok(())
            }
        }

        let backend = FailingEditBackend { tier: RwLock::new(Tier::Smart), planned: AtomicUsize::new(0) };
        let registry = registry_with_read_file();
        let policy = PermissionPolicy::new(Mode::Auto);
        let context = ContextManager::new(32_000, 0.85, 0.7);
        let parallel = ParallelExecutor::new(4);
        let cancel = CancellationToken::new();

        let flow = ArchitectEditor::new(
            &backend, &registry, &policy, &context, &parallel, &NullSink, &NoInput, "editor", 4, 128_000, 64_000,
        );
        let result = flow.run(&cancel, "add a feature").await;

        assert!(result.is_err());
        assert_eq!(backend.tier(), Tier::Smart, "original tier must be restored even on failure");
        assert_eq!(backend.planned.load(Ordering::SeqCst), 1);
    }
}
