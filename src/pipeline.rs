//! Pipeline orchestrator (M): sequences the planner (J), executor (K), and
//! verifier (L) agents behind a user approval gate, honoring cancellation
//! between every step, retry, and verifier call (spec.md §4.8).

use crate::agent_loop::AgentLoop;
use crate::agents::{executor as executor_agent, planner, verifier};
use crate::cancel::CancellationToken;
use crate::client::ChatBackend;
use crate::context::ContextManager;
use crate::error::{Error, Result};
use crate::executor::ParallelExecutor;
use crate::permission::PermissionPolicy;
use crate::sink::{OutputSink, PermissionInput, SinkEvent};
use crate::tools::ToolRegistry;
use crate::types::{AgentConfig, ExecutionResult, Intent, PipelineResult};

/// Bundles the pieces the orchestrator threads through every step: the
/// same set `AgentLoop` needs, plus the agent-level retry/verification
/// knobs that are orthogonal to backend resilience (`resilient.rs`
/// already handles network-level retry).
pub struct Orchestrator<'a> {
    backend: &'a dyn ChatBackend,
    registry: &'a ToolRegistry,
    policy: &'a PermissionPolicy,
    context: &'a ContextManager,
    parallel: &'a ParallelExecutor,
    sink: &'a (dyn OutputSink + Sync),
    input: &'a (dyn PermissionInput + Sync),
    system_prompt: String,
    preserve_last: usize,
    agent_config: AgentConfig,
}

impl<'a> Orchestrator<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: &'a dyn ChatBackend,
        registry: &'a ToolRegistry,
        policy: &'a PermissionPolicy,
        context: &'a ContextManager,
        parallel: &'a ParallelExecutor,
        sink: &'a (dyn OutputSink + Sync),
        input: &'a (dyn PermissionInput + Sync),
        system_prompt: impl Into<String>,
        preserve_last: usize,
        agent_config: AgentConfig,
    ) -> Self {
        Self {
            backend,
            registry,
            policy,
            context,
            parallel,
            sink,
            input,
            system_prompt: system_prompt.into(),
            preserve_last,
            agent_config,
        }
    }

    fn agent_loop(&self) -> AgentLoop<'_> {
        AgentLoop::new(
            self.backend,
            self.registry,
            self.policy,
            self.context,
            self.parallel,
            self.sink,
            self.input,
            self.system_prompt.clone(),
            self.preserve_last,
        )
    }

    /// Runs `task`, already classified as `intent`, through whichever path
    /// the intent calls for.
    pub async fn run(&self, cancel: &CancellationToken, task: &str, intent: Intent) -> Result<PipelineResult> {
        if !intent.should_use_multi_agent() {
            return self.run_single_agent(cancel, task, intent).await;
        }
        self.run_multi_agent(cancel, task).await
    }

    async fn run_single_agent(&self, cancel: &CancellationToken, task: &str, intent: Intent) -> Result<PipelineResult> {
        let agent_loop = self.agent_loop();
        let execution = executor_agent::execute(&agent_loop, self.context, cancel, task).await;

        let mut result = PipelineResult {
            plan: None,
            output: execution.output.clone(),
            ..Default::default()
        };

        if !execution.success {
            if let Some(e) = execution.error.clone() {
                result.errors.push(e);
            }
        } else if intent == Intent::Code {
            if cancel.is_cancelled() {
                return Err(Error::cancelled());
            }
            let changed = changed_files(std::slice::from_ref(&execution));
            let verification = verifier::verify(self.backend, self.registry, cancel, task, &changed).await?;
            result.verification = Some(verification);
        }

        result.executions.push(execution);
        Ok(result)
    }

    async fn run_multi_agent(&self, cancel: &CancellationToken, task: &str) -> Result<PipelineResult> {
        let mut plan = planner::plan(self.backend, cancel, task).await?;

        self.sink.send(SinkEvent::Plan(render_plan(&plan)));
        self.sink.send(SinkEvent::PermissionPrompt {
            tool: "plan".to_string(),
            level: crate::types::PermissionLevel::Write,
            description: "proceed with this plan?".to_string(),
        });
        let answer = self.input.read_line().await;
        if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes" | "a") {
            return Ok(PipelineResult {
                plan: Some(plan),
                output: "plan not approved, cancelled".to_string(),
                ..Default::default()
            });
        }

        let mut executions: Vec<ExecutionResult> = Vec::new();
        let mut errors = Vec::new();
        let mut previous_context = String::new();
        let max_attempts = self.agent_config.max_retries.max(1);

        loop {
            if cancel.is_cancelled() {
                return Err(Error::cancelled());
            }
            if plan.all_done() {
                break;
            }
            let ready = plan.ready_steps();
            let Some(step) = ready.first() else { break };
            let step_id = step.id.clone();
            let step_description = step.description.clone();

            let task_prompt = if previous_context.is_empty() {
                step_description.clone()
            } else {
                format!("{previous_context}\n\nNow: {step_description}")
            };

            let mut last_execution = None;
            let mut attempt = 0;
            loop {
                if cancel.is_cancelled() {
                    return Err(Error::cancelled());
                }
                attempt += 1;
                let agent_loop = self.agent_loop();
                let execution = executor_agent::execute(&agent_loop, self.context, cancel, &task_prompt).await;
                let succeeded = execution.success;
                last_execution = Some(execution);
                if succeeded || attempt >= max_attempts {
                    break;
                }
            }
            let execution = last_execution.expect("at least one attempt always runs");

            if execution.success {
                previous_context = format!("Step {step_id} completed: {}", execution.output);
                if let Some(s) = plan.steps.iter_mut().find(|s| s.id == step_id) {
                    s.done = true;
                }
                executions.push(execution);
            } else {
                let cause = execution.error.clone();
                executions.push(execution);
                errors.push(Error::pipeline_step_failed(step_id, cause));
                break;
            }
        }

        let verification = if self.agent_config.verification_enabled && !executions.is_empty() {
            if cancel.is_cancelled() {
                return Err(Error::cancelled());
            }
            let changed = changed_files(&executions);
            Some(verifier::verify(self.backend, self.registry, cancel, task, &changed).await?)
        } else {
            None
        };

        let output = summarize(&executions, &verification, &errors);

        Ok(PipelineResult {
            plan: Some(plan),
            executions,
            verification,
            errors,
            output,
        })
    }
}

fn changed_files(executions: &[ExecutionResult]) -> Vec<String> {
    let mut paths: Vec<String> = executions
        .iter()
        .flat_map(|e| &e.tool_calls)
        .filter(|call| call.name == "write_file" || call.name == "edit_file")
        .filter_map(|call| call.input.get("path").and_then(|v| v.as_str()).map(str::to_string))
        .collect();
    paths.dedup();
    paths
}

fn render_plan(plan: &crate::types::StructuredPlan) -> String {
    plan.steps
        .iter()
        .map(|s| {
            if s.depends_on.is_empty() {
                format!("{}. {}", s.id, s.description)
            } else {
                format!("{}. {} (depends on {})", s.id, s.description, s.depends_on.join(", "))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn summarize(
    executions: &[ExecutionResult],
    verification: &Option<crate::types::VerificationResult>,
    errors: &[Error],
) -> String {
    if let Some(e) = errors.first() {
        return format!("pipeline stopped: {}", e.user_message());
    }
    let steps_done = executions.iter().filter(|e| e.success).count();
    match verification {
        Some(v) if v.passed => format!("{steps_done} step(s) completed, verification passed"),
        Some(v) => format!("{steps_done} step(s) completed, verification failed: {}", v.summary),
        None => format!("{steps_done} step(s) completed"),
    }
}
