//! Task router (I): classifies a task's intent with a single zero-shot
//! fast-tier model call, so the pipeline orchestrator (M) can decide
//! between a direct single-agent turn and the full planner/executor/
//! verifier pipeline.

use crate::cancel::CancellationToken;
use crate::client::ChatBackend;
use crate::error::Result;
use crate::types::{Intent, Message, Tier};

const CLASSIFIER_SYSTEM_PROMPT: &str = "Classify the user's task into exactly one of: \
simple_chat, code, analysis, planning, search, memory, other. Respond with only that one word, \
nothing else.";

/// Classifies `task` by switching the backend to the fast tier for one
/// unary call, then restoring whatever tier was active before. The tier
/// swap is scoped to this call — it does not leave the backend on the
/// fast tier for whatever runs next.
pub async fn classify_intent(backend: &dyn ChatBackend, cancel: &CancellationToken, task: &str) -> Result<Intent> {
    let previous_tier = backend.tier();
    backend.set_tier(Tier::Fast);
    let result = backend
        .chat(cancel, &[Message::user(task)], &[], CLASSIFIER_SYSTEM_PROMPT)
        .await;
    backend.set_tier(previous_tier);

    let (text, _tool_calls, _usage) = result?;
    Ok(Intent::parse(&text))
}
