//! Memory / skills loader (P): read-only project knowledge injected into
//! prompts.
//!
//! Loading memory/skill files from disk is a UI/application concern, the
//! same way session persistence is (`sink.rs`'s `OnSave`) — this module
//! only defines the trait the application implements and the pure
//! function that turns whatever it returns into prompt text. The core
//! never touches a filesystem itself.

use crate::types::Message;

/// One piece of injectable project knowledge: a house style rule, a
/// remembered preference, a loaded skill's body. `title` is shown in the
/// rendered prompt as a heading so the model can cite which entry it's
/// drawing on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEntry {
    pub title: String,
    pub content: String,
}

impl MemoryEntry {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self { title: title.into(), content: content.into() }
    }
}

/// Supplies memory entries relevant to a task. Implementations typically
/// read a project's notes/skills directory; this crate only consumes the
/// result.
pub trait MemorySource: Send + Sync {
    /// Returns the entries relevant to `query`, most-relevant first.
    /// Implementations decide what "relevant" means (keyword match,
    /// embedding search, or simply every entry); an empty result means no
    /// injection happens.
    fn recall(&self, query: &str) -> Vec<MemoryEntry>;
}

/// A `MemorySource` with nothing to recall, for callers that haven't
/// wired one in.
pub struct NoMemory;

impl MemorySource for NoMemory {
    fn recall(&self, _query: &str) -> Vec<MemoryEntry> {
        Vec::new()
    }
}

/// Renders `entries` as a single user-role message the caller prepends to
/// the conversation before the task, one heading per entry. Returns
/// `None` for an empty slice rather than an empty message — nothing
/// worth injecting means nothing gets appended.
pub fn render(entries: &[MemoryEntry]) -> Option<Message> {
    if entries.is_empty() {
        return None;
    }
    let body = entries
        .iter()
        .map(|e| format!("## {}\n{}", e.title, e.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    Some(Message::user(format!(
        "Relevant project knowledge (for reference, not a task):\n\n{body}"
    )))
}
