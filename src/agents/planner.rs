//! Planner agent (J): turns a task description into an ordered
//! [`StructuredPlan`] via a single unary chat call.
//!
//! Asks the model for a JSON array of steps and parses it with the same
//! tolerant philosophy `stream.rs` uses for tool arguments: a response
//! that isn't valid JSON degrades to a single-step plan containing the raw
//! text rather than an error, since a plan the orchestrator can show the
//! user and let them reject is more useful than a hard failure here.

use serde::Deserialize;

use crate::cancel::CancellationToken;
use crate::client::ChatBackend;
use crate::error::Result;
use crate::types::{Message, Step, StructuredPlan};

const PLANNER_SYSTEM_PROMPT: &str = "You are a planning assistant. Break the user's task into an \
ordered list of concrete steps. Respond with ONLY a JSON array, no prose, where each element is \
an object: {\"id\": \"1\", \"description\": \"...\", \"depends_on\": [\"<ids of steps that must \
finish first>\"]}. Keep steps small and independently verifiable.";

#[derive(Debug, Deserialize)]
struct WireStep {
    id: String,
    description: String,
    #[serde(default)]
    depends_on: Vec<String>,
}

/// Produces a plan for `task`. The backend is assumed already set to
/// whatever tier the caller wants the planner to reason at — this
/// function does not switch tiers itself (unlike the router, which owns
/// a tier swap scoped to its own call).
pub async fn plan(backend: &dyn ChatBackend, cancel: &CancellationToken, task: &str) -> Result<StructuredPlan> {
    let (text, _tool_calls, _usage) = backend
        .chat(cancel, &[Message::user(task)], &[], PLANNER_SYSTEM_PROMPT)
        .await?;

    Ok(parse_plan(&text))
}

fn parse_plan(text: &str) -> StructuredPlan {
    let json_slice = extract_json_array(text);
    if let Ok(wire_steps) = serde_json::from_str::<Vec<WireStep>>(json_slice) {
        if !wire_steps.is_empty() {
            return StructuredPlan {
                steps: wire_steps
                    .into_iter()
                    .map(|w| Step::new(w.id, w.description, w.depends_on))
                    .collect(),
            };
        }
    }

    // Degraded fallback: one step carrying the raw response, so the
    // orchestrator still has something to show for an approval prompt.
    StructuredPlan {
        steps: vec![Step::new("1", text.trim(), vec![])],
    }
}

/// Finds the first `[...]` span in `text`, tolerating a model that wraps
/// its JSON in prose or a code fence despite instructions not to.
fn extract_json_array(text: &str) -> &str {
    let start = text.find('[');
    let end = text.rfind(']');
    match (start, end) {
        (Some(s), Some(e)) if s < e => &text[s..=e],
        _ => text,
    }
}
