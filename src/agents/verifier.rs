//! Verifier agent (L): post-execution checks on the files a step changed.
//!
//! Reads each changed file back through the registry's own `read_file`
//! tool (so verification sees exactly what's on disk, not what the
//! executor *thinks* it wrote) and asks the model for a pass/fail
//! judgment with a short explanation.

use serde_json::{Map, Value};

use crate::cancel::CancellationToken;
use crate::client::ChatBackend;
use crate::error::Result;
use crate::tools::ToolRegistry;
use crate::types::{Message, VerificationResult};

const VERIFIER_SYSTEM_PROMPT: &str = "You are reviewing code changes for correctness against the \
original task. The first line of your response must be exactly PASS or FAIL; every following \
line is a short explanation.";

/// Verifies `changed_files` against `original_task`. Missing or unreadable
/// files are reported in the prompt as such rather than aborting — a
/// verifier that can't see a file should say so in its summary, not
/// silently skip it.
pub async fn verify(
    backend: &dyn ChatBackend,
    registry: &ToolRegistry,
    cancel: &CancellationToken,
    original_task: &str,
    changed_files: &[String],
) -> Result<VerificationResult> {
    if changed_files.is_empty() {
        return Ok(VerificationResult {
            summary: "no files changed, nothing to verify".to_string(),
            passed: true,
        });
    }

    let mut bundle = String::new();
    for path in changed_files {
        let mut args = Map::new();
        args.insert("path".to_string(), Value::String(path.clone()));
        let call = crate::types::ToolCall::new(format!("verify-{path}"), "read_file", args);
        match registry.execute(cancel, &call).await {
            Ok(contents) => {
                bundle.push_str(&format!("--- {path} ---\n{contents}\n\n"));
            }
            Err(e) => {
                bundle.push_str(&format!("--- {path} ---\n[could not read: {e}]\n\n"));
            }
        }
    }

    let prompt = format!(
        "Original task:\n{original_task}\n\nChanged files:\n{bundle}\nDoes this satisfy the task?"
    );
    let (text, _tool_calls, _usage) = backend.chat(cancel, &[Message::user(prompt)], &[], VERIFIER_SYSTEM_PROMPT).await?;

    let passed = text
        .lines()
        .next()
        .map(|line| line.trim().eq_ignore_ascii_case("pass"))
        .unwrap_or(false);

    Ok(VerificationResult { summary: text, passed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tool;
    use crate::types::{PermissionLevel, StreamChunk, Tier, ToolCall, ToolDefinition, Usage};
    use serde_json::json;
    use std::pin::Pin;
    use std::sync::Mutex;

    struct FakeBackend {
        response: String,
        received_prompt: Mutex<Option<String>>,
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
            *self.received_prompt.lock().unwrap() = Some(messages[0].content.clone());
            Ok((self.response.clone(), vec![], None))
        }

        async fn stream_chat(
            &self,
            _cancel: CancellationToken,
            _messages: &[Message],
            _tools: &[ToolDefinition],
            _system_prompt: &str,
        ) -> Result<Pin<Box<dyn futures::Stream<Item = StreamChunk> + Send>>> {
            unimplemented!()
        }

        fn tier(&self) -> Tier {
            Tier::Genius
        }
        fn set_tier(&self, _tier: Tier) {}

        fn temperature(&self) -> f32 {
            0.7
        }

        fn set_temperature(&self, _temperature: f32) {}
        fn context_window(&self) -> u32 {
            128_000
        }
        async fn check_health(&self, _cancel: &CancellationToken) -> Result<()> {
            Ok(())
        }
    }

    fn registry_with_file(path: &str, contents: &str) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        let contents = contents.to_string();
        let path = path.to_string();
        registry.register(
            tool("read_file", "reads a file")
                .permission_level(PermissionLevel::Read)
                .build(move |args| {
                    let contents = contents.clone();
                    let expected_path = path.clone();
                    async move {
                        let requested = args["path"].as_str().unwrap_or_default();
                        if requested == expected_path {
                            Ok(json!(contents))
                        } else {
                            Ok(json!(""))
                        }
                    }
                }),
        );
        registry
    }

    #[tokio::test]
    async fn no_changed_files_passes_trivially() {
        let backend = FakeBackend { response: String::new(), received_prompt: Mutex::new(None) };
        let registry = ToolRegistry::new();
        let cancel = CancellationToken::new();
        let result = verify(&backend, &registry, &cancel, "task", &[]).await.unwrap();
        assert!(result.passed);
    }

    #[tokio::test]
    async fn pass_response_is_parsed() {
        let backend = FakeBackend {
            response: "PASS\nlooks correct, tests added".to_string(),
            received_prompt: Mutex::new(None),
        };
        let registry = registry_with_file("src/lib.rs", "fn add() {}");
        let cancel = CancellationToken::new();
        let result = verify(&backend, &registry, &cancel, "add a function", &["src/lib.rs".to_string()])
            .await
            .unwrap();
        assert!(result.passed);

        let prompt = backend.received_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("fn add() {}"));
    }

    #[tokio::test]
    async fn fail_response_is_parsed() {
        let backend = FakeBackend {
            response: "FAIL\nmissing error handling".to_string(),
            received_prompt: Mutex::new(None),
        };
        let registry = registry_with_file("src/lib.rs", "fn add() {}");
        let cancel = CancellationToken::new();
        let result = verify(&backend, &registry, &cancel, "add a function", &["src/lib.rs".to_string()])
            .await
            .unwrap();
        assert!(!result.passed);
    }

    #[tokio::test]
    async fn unreadable_file_is_reported_in_the_prompt_not_an_error() {
        let backend = FakeBackend { response: "FAIL\ncould not verify".to_string(), received_prompt: Mutex::new(None) };
        let registry = ToolRegistry::new(); // no read_file registered
        let cancel = CancellationToken::new();
        let result = verify(&backend, &registry, &cancel, "task", &["missing.rs".to_string()]).await.unwrap();
        assert!(!result.passed);
        let prompt = backend.received_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("could not read"));
    }
}
