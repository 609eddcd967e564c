//! Context manager (F): conversation message log, token accounting,
//! threshold-driven stats, tool-result masking, and prefix-replacing
//! compaction installs.
//!
//! Generalizes the teacher's free-function `estimate_tokens`/
//! `truncate_messages`/`is_approaching_limit` API (a stateless helper
//! module) into a stateful, lock-protected manager — the conversation now
//! owns its own message log rather than handing the caller a `Vec` to
//! truncate by hand. `on_save` is invoked outside the lock with a cloned
//! snapshot (SPEC_FULL.md §9, "cyclic ownership") so a re-entrant callback
//! can never deadlock against the manager it's saving.

use std::sync::RwLock;

use crate::sink::OnSave;
use crate::types::{ContextStats, Message, MessageRole};

/// Fixed per-message structural overhead folded into the token estimate,
/// on top of the content itself (role/field framing the wire format adds).
const MESSAGE_OVERHEAD_TOKENS: f32 = 10.0;

/// Safety margin added on top of the base character-based estimate —
/// the estimator is a heuristic, never authoritative (spec.md §4.6).
const SAFETY_BUFFER: f32 = 1.10;

/// Punctuation density above which content is treated as code-like
/// (denser token boundaries, fewer chars per token).
const CODE_PUNCTUATION_THRESHOLD: f32 = 0.15;
const CODE_CHARS_PER_TOKEN: f32 = 3.2;
const PROSE_CHARS_PER_TOKEN: f32 = 4.0;

/// Character-based token estimate for one piece of content. Classifies
/// the content as code-like (punctuation density > 15%) or prose and
/// applies the matching chars-per-token ratio. Never exact — the
/// backend's own `prompt_eval_count`/`eval_count` (§4.1) is authoritative
/// whenever the caller has it; this exists for the threshold checks that
/// run between turns, before a response's usage is known.
pub fn estimate_tokens(text: &str) -> usize {
    let char_count = text.chars().count();
    if char_count == 0 {
        return 0;
    }
    let punctuation = text.chars().filter(|c| c.is_ascii_punctuation()).count();
    let density = punctuation as f32 / char_count as f32;
    let chars_per_token = if density > CODE_PUNCTUATION_THRESHOLD {
        CODE_CHARS_PER_TOKEN
    } else {
        PROSE_CHARS_PER_TOKEN
    };
    (char_count as f32 / chars_per_token).ceil() as usize
}

/// Total estimated tokens for a system prompt plus a message list,
/// including per-message overhead and the safety buffer.
pub fn estimate_conversation_tokens(system_prompt: &str, messages: &[Message]) -> usize {
    let mut total = estimate_tokens(system_prompt) as f32;
    for m in messages {
        total += estimate_tokens(&m.content) as f32 + MESSAGE_OVERHEAD_TOKENS;
    }
    (total * SAFETY_BUFFER).ceil() as usize
}

/// Masks tool-role message content older than the most recent
/// `preserve_recent` tool messages, leaving every other field (including
/// `tool_call_id`) untouched so the tool-call linkage invariant survives
/// (spec.md §4.6, testable property "masking preserves role and
/// tool_call_id for every message").
pub fn mask_old_tool_results(messages: &[Message], preserve_recent: usize) -> Vec<Message> {
    let tool_positions: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == MessageRole::Tool)
        .map(|(i, _)| i)
        .collect();

    if tool_positions.len() <= preserve_recent {
        return messages.to_vec();
    }

    let mask_count = tool_positions.len() - preserve_recent;
    let to_mask: std::collections::HashSet<usize> =
        tool_positions[..mask_count].iter().copied().collect();

    messages
        .iter()
        .enumerate()
        .map(|(i, m)| {
            if to_mask.contains(&i) {
                let mut masked = m.clone();
                masked.content = mask_marker(&m.content);
                masked
            } else {
                m.clone()
            }
        })
        .collect()
}

fn mask_marker(content: &str) -> String {
    let line_count = content.lines().count().max(1);
    let first_line: String = content.lines().next().unwrap_or("").chars().take(80).collect();
    format!("[Masked: {line_count} lines, preview: {first_line}\u{2026}]")
}

struct State {
    messages: Vec<Message>,
    context_window: u32,
    cached_stats: Option<ContextStats>,
    dirty: bool,
}

/// Thread-safe conversation state: the message log plus the derived
/// stats the agent loop and compactor consult every turn.
pub struct ContextManager {
    state: RwLock<State>,
    system_prompt: RwLock<String>,
    auto_compact_threshold: f32,
    warn_threshold: f32,
    on_save: RwLock<Option<OnSave>>,
}

impl ContextManager {
    pub fn new(context_window: u32, auto_compact_threshold: f32, warn_threshold: f32) -> Self {
        Self {
            state: RwLock::new(State {
                messages: Vec::new(),
                context_window,
                cached_stats: None,
                dirty: true,
            }),
            system_prompt: RwLock::new(String::new()),
            auto_compact_threshold,
            warn_threshold,
            on_save: RwLock::new(None),
        }
    }

    pub fn set_system_prompt(&self, prompt: impl Into<String>) {
        *self.system_prompt.write().expect("context lock poisoned") = prompt.into();
        self.mark_dirty();
    }

    pub fn set_on_save(&self, callback: OnSave) {
        *self.on_save.write().expect("context lock poisoned") = Some(callback);
    }

    /// Appends one message in arrival order and invokes `on_save` (if
    /// set) with a snapshot taken *after* the lock is released.
    pub fn append(&self, message: Message) {
        let snapshot = {
            let mut state = self.state.write().expect("context lock poisoned");
            state.messages.push(message);
            state.dirty = true;
            state.messages.clone()
        };
        self.invoke_on_save(snapshot);
    }

    /// Replaces the entire message log, e.g. when restoring a saved
    /// session. Does not itself invoke `on_save` — a restore is not a new
    /// fact worth re-persisting.
    pub fn restore(&self, messages: Vec<Message>) {
        let mut state = self.state.write().expect("context lock poisoned");
        state.messages = messages;
        state.dirty = true;
    }

    /// A defensive copy of every message in arrival order.
    pub fn messages(&self) -> Vec<Message> {
        self.state.read().expect("context lock poisoned").messages.clone()
    }

    /// The last `n` messages, oldest-first.
    pub fn recent(&self, n: usize) -> Vec<Message> {
        let state = self.state.read().expect("context lock poisoned");
        let start = state.messages.len().saturating_sub(n);
        state.messages[start..].to_vec()
    }

    /// Everything before the last `n` messages.
    pub fn older(&self, n: usize) -> Vec<Message> {
        let state = self.state.read().expect("context lock poisoned");
        let end = state.messages.len().saturating_sub(n);
        state.messages[..end].to_vec()
    }

    pub fn clear(&self) {
        let mut state = self.state.write().expect("context lock poisoned");
        state.messages.clear();
        state.dirty = true;
    }

    pub fn set_context_window(&self, window: u32) {
        let mut state = self.state.write().expect("context lock poisoned");
        state.context_window = window;
        state.dirty = true;
    }

    /// Erases the prefix and installs a `{user: summary, assistant: ack}`
    /// pair ahead of the preserved suffix (spec.md §4.6). The caller
    /// typically feeds `CompactionResult::summary`/`preserved_recent`
    /// straight through from `compactor.rs`.
    pub fn replace_with_summary(&self, summary: impl Into<String>, preserve_recent: usize) {
        let snapshot = {
            let mut state = self.state.write().expect("context lock poisoned");
            let keep_from = state.messages.len().saturating_sub(preserve_recent);
            let preserved = state.messages.split_off(keep_from);
            let mut replacement = vec![
                Message::user(summary),
                Message::assistant(
                    "Understood \u{2014} I have the summarized context and will continue from here.",
                    vec![],
                ),
            ];
            replacement.extend(preserved);
            state.messages = replacement;
            state.dirty = true;
            state.messages.clone()
        };
        self.invoke_on_save(snapshot);
    }

    /// Computes [`ContextStats`], caching the result until the next
    /// mutation (append/restore/clear/set_context_window/
    /// replace_with_summary) marks the state dirty again — calling this
    /// twice with no intervening mutation returns identical values.
    pub fn get_stats(&self) -> ContextStats {
        let mut state = self.state.write().expect("context lock poisoned");
        if !state.dirty {
            if let Some(cached) = state.cached_stats {
                return cached;
            }
        }
        let system_prompt = self.system_prompt.read().expect("context lock poisoned").clone();
        let used_tokens = estimate_conversation_tokens(&system_prompt, &state.messages);
        let context_window = state.context_window as usize;
        let usage_percent = if context_window == 0 {
            1.0
        } else {
            used_tokens as f32 / context_window as f32
        };
        let stats = ContextStats {
            used_tokens,
            context_window,
            usage_percent,
            message_count: state.messages.len(),
            needs_compaction: usage_percent >= self.auto_compact_threshold,
            needs_warning: usage_percent >= self.warn_threshold && usage_percent < self.auto_compact_threshold,
        };
        state.cached_stats = Some(stats);
        state.dirty = false;
        stats
    }

    fn mark_dirty(&self) {
        self.state.write().expect("context lock poisoned").dirty = true;
    }

    fn invoke_on_save(&self, snapshot: Vec<Message>) {
        if let Some(cb) = self.on_save.read().expect("context lock poisoned").clone() {
            cb(snapshot);
        }
    }
}
