//! Multi-Tool Agent Example
//!
//! An agent with a handful of tools (arithmetic, current time, unit
//! conversion) driven through the full tool-call loop, printing every
//! tool invocation and result via a console `OutputSink`.
//!
//! Requires:
//!   - Ollama running on localhost:11434
//!   - qwen2.5-coder:14b (or adjust model_smart below)

use std::pin::Pin;
use std::sync::Arc;

use open_agent_core::prelude::*;
use serde_json::json;

struct ConsoleSink;
impl OutputSink for ConsoleSink {
    fn send(&self, event: SinkEvent) {
        match event {
            SinkEvent::ToolCall { name, input } => println!("-> {name}({input})"),
            SinkEvent::ToolResult { name, text, is_error } => {
                let tag = if is_error { "error" } else { "ok" };
                println!("<- {name} [{tag}]: {text}");
            }
            SinkEvent::Text(text) => print!("{text}"),
            SinkEvent::Error(msg) => eprintln!("error: {msg}"),
            _ => {}
        }
    }
}

struct AlwaysApprove;
impl PermissionInput for AlwaysApprove {
    fn read_line(&self) -> Pin<Box<dyn std::future::Future<Output = String> + Send + '_>> {
        Box::pin(async { "a".to_string() })
    }
}

fn build_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(
        tool("calculate", "Evaluate a simple arithmetic expression")
            .schema(json!({
                "type": "object",
                "properties": {"a": {"type": "number"}, "b": {"type": "number"}, "op": {"type": "string"}},
                "required": ["a", "b", "op"],
            }))
            .build(|args| async move {
                let a = args["a"].as_f64().unwrap_or(0.0);
                let b = args["b"].as_f64().unwrap_or(0.0);
                let result = match args["op"].as_str().unwrap_or("+") {
                    "+" => a + b,
                    "-" => a - b,
                    "*" => a * b,
                    "/" if b != 0.0 => a / b,
                    "/" => return Err(open_agent_core::Error::tool_execution_failed("calculate", None)),
                    other => {
                        return Err(open_agent_core::Error::tool_execution_failed(
                            format!("calculate: unknown op {other}"),
                            None,
                        ))
                    }
                };
                Ok(json!({"result": result}))
            }),
    );

    registry.register(
        tool("convert_celsius_to_fahrenheit", "Convert a Celsius temperature to Fahrenheit")
            .schema(json!({"type": "object", "properties": {"celsius": {"type": "number"}}, "required": ["celsius"]}))
            .build(|args| async move {
                let c = args["celsius"].as_f64().unwrap_or(0.0);
                Ok(json!({"fahrenheit": c * 9.0 / 5.0 + 32.0}))
            }),
    );

    registry
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

    let registry = build_registry();
    let policy = PermissionPolicy::new(Mode::Ask);
    let context = ContextManager::new(config.context_window, config.auto_compact_threshold, config.warn_threshold);
    let executor = ParallelExecutor::new(4);
    let sink = ConsoleSink;
    let input = AlwaysApprove;
    let cancel = CancellationToken::new();

    let agent_loop = AgentLoop::new(
        &backend, &registry, &policy, &context, &executor, &sink, &input,
        "You are a helpful assistant with calculator and unit-conversion tools.",
        config.preserve_last,
    );

    let outcome = agent_loop
        .run_task(&cancel, "What's 37 degrees Celsius in Fahrenheit, and what's 12 times 8?")
        .await?;
    println!("\nFinal answer: {}", outcome.text);

    Ok(())
}
