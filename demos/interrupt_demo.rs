//! Interrupt Capability Demo
//!
//! Demonstrates cancelling an in-flight agent turn with
//! `cancel::CancellationToken`:
//!
//! 1. A deadline-based cancel (cancel the token after a fixed duration).
//! 2. A concurrent cancel button (a second task flips the token based on
//!    an external condition, simulating a user pressing Ctrl-C).
//!
//! Requires Ollama running at http://localhost:11434 with a model loaded.

use std::sync::Arc;
use std::time::Duration;

use open_agent_core::prelude::*;

struct StdinInput;
impl PermissionInput for StdinInput {
    fn read_line(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = String> + Send + '_>> {
        Box::pin(async { "y".to_string() })
    }
}

fn build(config: Arc<Config>) -> Result<ResilientClient, Box<dyn std::error::Error>> {
    let client = Client::new(config)?;
    Ok(ResilientClient::new(client, Default::default()))
}

async fn deadline_cancel(config: Arc<Config>) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Deadline-based cancel ===");

    let backend = build(config.clone())?;
    let registry = ToolRegistry::new();
    let policy = PermissionPolicy::new(Mode::Auto);
    let context = ContextManager::new(config.context_window, config.auto_compact_threshold, config.warn_threshold);
    let executor = ParallelExecutor::new(4);
    let input = StdinInput;
    let cancel = CancellationToken::new();

    let deadline_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        deadline_cancel.cancel();
    });

    let agent_loop = AgentLoop::new(
        &backend, &registry, &policy, &context, &executor, &NullSink, &input,
        "You are a helpful assistant. Be verbose.", config.preserve_last,
    );
    match agent_loop.run_task(&cancel, "Write a detailed 1000-word essay about quantum computing").await {
        Ok(outcome) => println!("completed within the deadline: {} chars", outcome.text.len()),
        Err(e) => println!("cancelled: {e}"),
    }
    println!();
    Ok(())
}

async fn concurrent_cancel_button(config: Arc<Config>) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Concurrent cancel button ===");

    let backend = build(config.clone())?;
    let registry = ToolRegistry::new();
    let policy = PermissionPolicy::new(Mode::Auto);
    let context = ContextManager::new(config.context_window, config.auto_compact_threshold, config.warn_threshold);
    let executor = ParallelExecutor::new(4);
    let input = StdinInput;
    let cancel = CancellationToken::new();

    let button = cancel.clone();
    let cancel_signal = Arc::new(tokio::sync::Notify::new());
    let waiter = cancel_signal.clone();
    tokio::spawn(async move {
        waiter.notified().await;
        button.cancel();
    });

    // Simulates the user pressing a cancel button after deciding the
    // response is no longer needed.
    cancel_signal.notify_one();

    let agent_loop = AgentLoop::new(
        &backend, &registry, &policy, &context, &executor, &NullSink, &input,
        "You are a helpful assistant.", config.preserve_last,
    );
    match agent_loop.run_task(&cancel, "What's the capital of France?").await {
        Ok(outcome) => println!("completed before cancel took effect: {}", outcome.text),
        Err(e) => println!("cancelled: {e}"),
    }
    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(
        Config::builder()
            .base_url("http://localhost:11434")
            .model_smart("qwen2.5-coder:14b")
            .build()?,
    );

    deadline_cancel(config.clone()).await?;
    concurrent_cancel_button(config).await?;
    Ok(())
}
