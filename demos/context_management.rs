//! Context Management Examples
//!
//! Three patterns for keeping a long-running conversation inside a model's
//! context window: a fresh `ContextManager` per task, masking stale tool
//! output while keeping the most recent exchanges intact, and watching
//! `get_stats()` to decide when to compact.

use open_agent_core::context::{mask_old_tool_results, ContextManager};
use open_agent_core::types::Message;

fn main() {
    println!("{}", "=".repeat(70));
    println!("CONTEXT MANAGEMENT EXAMPLES");
    println!("{}", "=".repeat(70));
    println!();

    pattern_1_stateless();
    pattern_2_masking();
    pattern_3_stats_monitoring();
}

/// Pattern 1: stateless agents. Best for single-task agents (formatter,
/// linter, one-shot summarizer) that should never see a previous task's
/// history.
fn pattern_1_stateless() {
    println!("=== Pattern 1: Stateless Agents ===");

    let tasks = ["Explain Rust", "Explain Python", "Explain JavaScript"];
    for task in tasks {
        // A fresh ContextManager per task means zero history accumulation.
        let context = ContextManager::new(32_000, 0.85, 0.7);
        context.append(Message::user(task));
        println!("Task: {task} -> {} message(s) in context", context.messages().len());
    }
    println!();
}

/// Pattern 2: masking stale tool results at a natural breakpoint (the end
/// of a step) rather than discarding them outright — `tool_call_id`
/// linkage survives so the conversation still parses, but the bulk of the
/// content is gone.
fn pattern_2_masking() {
    println!("=== Pattern 2: Masking Stale Tool Output ===");

    let mut messages = Vec::new();
    for i in 0..6 {
        messages.push(Message::assistant(
            "",
            vec![open_agent_core::types::ToolCall::new(
                format!("c{i}"),
                "read_file",
                serde_json::Map::new(),
            )],
        ));
        messages.push(Message::tool_result(format!("c{i}"), format!("contents of file {i}")));
    }

    let masked = mask_old_tool_results(&messages, 2);
    let masked_count = masked.iter().filter(|m| m.content.starts_with("[Masked")).count();
    println!("{masked_count} of {} tool results masked, most recent 2 left intact", messages.len() / 2);
    println!();
}

/// Pattern 3: watching `get_stats()` between turns to decide when
/// compaction (`compactor.rs`) should run, rather than guessing a fixed
/// turn count.
fn pattern_3_stats_monitoring() {
    println!("=== Pattern 3: Token Budget Monitoring ===");

    let context = ContextManager::new(1_000, 0.8, 0.6);
    let interactions = [
        "What is Rust?",
        "Explain ownership",
        "What are lifetimes?",
        "How do traits work?",
        "Explain async/await",
    ];

    for (i, prompt) in interactions.iter().enumerate() {
        context.append(Message::user(*prompt));
        context.append(Message::assistant(
            "a moderately detailed explanation would go here in a real session",
            vec![],
        ));

        let stats = context.get_stats();
        println!(
            "Interaction {}: {} messages, {} tokens ({:.0}% of window)",
            i + 1,
            stats.message_count,
            stats.used_tokens,
            stats.usage_percent * 100.0
        );
        if stats.needs_compaction {
            println!("  -> approaching the compaction threshold, a caller would compact here");
        }
    }
    println!();
}
