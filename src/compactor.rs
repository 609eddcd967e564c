//! Compactor (G): LLM-driven summarization of a conversation prefix.
//!
//! Issues one unary `chat()` call through the backend, in the style of the
//! teacher's `query()` free function (`client.rs`) — no streaming, no tool
//! calls, just a single-turn request whose text response is the summary.
//! The caller installs the result with
//! [`crate::context::ContextManager::replace_with_summary`].

use crate::cancel::CancellationToken;
use crate::client::ChatBackend;
use crate::context::estimate_conversation_tokens;
use crate::error::Result;
use crate::types::Message;

const COMPACTION_SYSTEM_PROMPT: &str = "You are summarizing part of an ongoing coding session \
so the conversation can continue with less context. Produce a structured bullet summary that \
captures: decisions made, code changes, technical context (file paths, function names, \
versions), task state (what is done, what remains), and user preferences. Be dense and factual; \
omit pleasantries.";

/// Outcome of one compaction pass.
#[derive(Debug, Clone)]
pub struct CompactionResult {
    pub summary: String,
    pub preserved_recent: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
    pub tokens_saved: usize,
    pub messages_summarized: usize,
}

/// Formats the messages to summarize as a numbered transcript and asks the
/// backend for a structured summary. `messages` is the full conversation;
/// `preserve_recent` marks how many trailing messages stay verbatim and are
/// excluded from the transcript. `focus_hint` steers the summary toward
/// what matters for the task at hand (e.g. "preserve the test failures and
/// the plan for fixing them").
///
/// If `preserve_recent >= messages.len()`, there is nothing to summarize;
/// returns a preserved-only result with an empty summary and zero token
/// savings rather than making a pointless model call.
pub async fn compact(
    backend: &dyn ChatBackend,
    cancel: &CancellationToken,
    messages: &[Message],
    focus_hint: &str,
    preserve_recent: usize,
) -> Result<CompactionResult> {
    let tokens_before = estimate_conversation_tokens("", messages);

    if preserve_recent >= messages.len() {
        log::debug!(
            "compaction skipped: only {} messages, preserve_recent={}",
            messages.len(),
            preserve_recent
        );
        return Ok(CompactionResult {
            summary: String::new(),
            preserved_recent: messages.len(),
            tokens_before,
            tokens_after: tokens_before,
            tokens_saved: 0,
            messages_summarized: 0,
        });
    }

    let to_summarize = &messages[..messages.len() - preserve_recent];
    let transcript = format_transcript(to_summarize);

    let prompt = if focus_hint.is_empty() {
        format!("Summarize the following conversation excerpt:\n\n{transcript}")
    } else {
        format!(
            "Summarize the following conversation excerpt, with particular attention to: \
             {focus_hint}\n\n{transcript}"
        )
    };

    let request = vec![Message::user(prompt)];
    let (summary, _tool_calls, _usage) = backend
        .chat(cancel, &request, &[], COMPACTION_SYSTEM_PROMPT)
        .await?;

    let preserved = &messages[messages.len() - preserve_recent..];
    let tokens_after = estimate_conversation_tokens("", preserved) + estimate_conversation_tokens("", &[Message::user(&summary)]);
    let tokens_saved = tokens_before.saturating_sub(tokens_after);

    log::info!(
        "compaction run: {} messages summarized, {preserve_recent} preserved, {tokens_saved} tokens saved ({tokens_before} -> {tokens_after})",
        to_summarize.len()
    );

    Ok(CompactionResult {
        summary,
        preserved_recent: preserve_recent,
        tokens_before,
        tokens_after,
        tokens_saved,
        messages_summarized: to_summarize.len(),
    })
}

fn format_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .enumerate()
        .map(|(i, m)| format!("{}. [{:?}] {}", i + 1, m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StreamChunk, Tier, ToolCall, ToolDefinition, Usage};
    use std::pin::Pin;
    use std::sync::Mutex;

    struct FakeBackend {
        response: Mutex<Option<String>>,
        received_messages: Mutex<Option<Vec<Message>>>,
    }

    #[async_trait::async_trait]
    impl ChatBackend for FakeBackend {
        async fn chat(
            &self,
            _cancel: &CancellationToken,
            messages: &[Message],
            _tools: &[ToolDefinition],
            _system_prompt: &str,
        ) -> Result<(String, Vec<ToolCall>, Option<Usage>)> {
            *self.received_messages.lock().unwrap() = Some(messages.to_vec());
            let response = self.response.lock().unwrap().clone().unwrap_or_default();
            Ok((response, vec![], None))
        }

        async fn stream_chat(
            &self,
            _cancel: CancellationToken,
            _messages: &[Message],
            _tools: &[ToolDefinition],
            _system_prompt: &str,
        ) -> Result<Pin<Box<dyn futures::Stream<Item = StreamChunk> + Send>>> {
            unimplemented!("not used by the compactor")
        }

        fn tier(&self) -> Tier {
            Tier::Smart
        }

        fn set_tier(&self, _tier: Tier) {}

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

    #[tokio::test]
    async fn compacts_prefix_and_keeps_recent_out_of_the_transcript() {
        let backend = FakeBackend {
            response: Mutex::new(Some("- did X\n- decided Y".to_string())),
            received_messages: Mutex::new(None),
        };
        let messages: Vec<Message> = (0..10).map(|i| Message::user(format!("message {i}"))).collect();
        let cancel = CancellationToken::new();

        let result = compact(&backend, &cancel, &messages, "preserve decisions", 4)
            .await
            .unwrap();

        assert_eq!(result.summary, "- did X\n- decided Y");
        assert_eq!(result.preserved_recent, 4);
        assert_eq!(result.messages_summarized, 6);

        let sent = backend.received_messages.lock().unwrap().clone().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].content.contains("preserve decisions"));
        assert!(sent[0].content.contains("message 5"));
        assert!(!sent[0].content.contains("message 9"), "recent messages must stay out of the transcript");
    }

    #[tokio::test]
    async fn nothing_to_summarize_skips_the_model_call() {
        let backend = FakeBackend {
            response: Mutex::new(None),
            received_messages: Mutex::new(None),
        };
        let messages = vec![Message::user("only one")];
        let cancel = CancellationToken::new();

        let result = compact(&backend, &cancel, &messages, "", 4).await.unwrap();
        assert_eq!(result.summary, "");
        assert_eq!(result.messages_summarized, 0);
        assert_eq!(result.tokens_saved, 0);
        assert!(backend.received_messages.lock().unwrap().is_none(), "no call should have been made");
    }

    #[tokio::test]
    async fn empty_focus_hint_omits_the_steering_clause() {
        let backend = FakeBackend {
            response: Mutex::new(Some("summary".to_string())),
            received_messages: Mutex::new(None),
        };
        let messages: Vec<Message> = (0..5).map(|i| Message::user(format!("m{i}"))).collect();
        let cancel = CancellationToken::new();

        compact(&backend, &cancel, &messages, "", 2).await.unwrap();
        let sent = backend.received_messages.lock().unwrap().clone().unwrap();
        assert!(!sent[0].content.contains("particular attention"));
    }
}
