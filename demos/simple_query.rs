//! Simple query example
//!
//! Demonstrates the smallest possible agent loop: no tools, one turn,
//! printing the final answer.

use std::sync::Arc;

use open_agent_core::prelude::*;

struct StdinInput;
impl PermissionInput for StdinInput {
    fn read_line(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = String> + Send + '_>> {
        Box::pin(async { "y".to_string() })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::builder()
        .base_url("http://localhost:11434")
        .model_smart("qwen2.5-coder:14b")
        .build()?;
    let config = Arc::new(config);

    let client = Client::new(config.clone())?;
    let backend = ResilientClient::new(client, Default::default());

    let registry = ToolRegistry::new();
    let policy = PermissionPolicy::new(Mode::Auto);
    let context = ContextManager::new(config.context_window, config.auto_compact_threshold, config.warn_threshold);
    let executor = ParallelExecutor::new(4);
    let input = StdinInput;
    let cancel = CancellationToken::new();

    let agent_loop = AgentLoop::new(
        &backend, &registry, &policy, &context, &executor, &NullSink, &input,
        "You are a helpful assistant.", config.preserve_last,
    );

    println!("Sending query to model...\n");
    let outcome = agent_loop.run_task(&cancel, "What's the capital of France? Please be brief.").await?;
    println!("Response: {}", outcome.text);

    Ok(())
}
