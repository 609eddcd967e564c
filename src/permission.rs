//! Permission policy (D): ask/auto/strict modes over cached always/never
//! decisions, serialized through the application's single input channel.
//!
//! The decision cache reuses the teacher's first-match-wins, `Arc`-shared
//! state idiom from `hooks.rs`, but is a dedicated ask/auto/strict gate
//! rather than a hook — there is no `continue_execution`/`modified_input`
//! machinery here, just allow or deny.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::sink::{OutputSink, PermissionInput, SinkEvent};
use crate::types::{CachedDecision, PermissionLevel};

/// Authorization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Auto-approve `read`; prompt for `write`/`execute`.
    Ask,
    /// Approve every level without prompting.
    Auto,
    /// Prompt for every level, including `read`.
    Strict,
}

/// Decision gate for a single tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Ask/auto/strict permission gate with a per-process always/never cache,
/// keyed by tool name.
pub struct PermissionPolicy {
    mode: RwLock<Mode>,
    saved_mode: RwLock<Option<Mode>>,
    cache: RwLock<HashMap<String, CachedDecision>>,
}

impl PermissionPolicy {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode: RwLock::new(mode),
            saved_mode: RwLock::new(None),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> Mode {
        *self.mode.read().expect("permission mode lock poisoned")
    }

    /// Switches mode, stashing the previous one so [`PermissionPolicy::restore_mode`]
    /// can undo it (e.g. a UI toggling between Ask/Plan/Build operating modes).
    pub fn set_mode(&self, mode: Mode) {
        let previous = *self.mode.read().expect("permission mode lock poisoned");
        *self.saved_mode.write().expect("permission mode lock poisoned") = Some(previous);
        *self.mode.write().expect("permission mode lock poisoned") = mode;
    }

    /// Restores the mode saved by the last [`PermissionPolicy::set_mode`] call, if any.
    pub fn restore_mode(&self) {
        if let Some(previous) = self.saved_mode.write().expect("permission mode lock poisoned").take() {
            *self.mode.write().expect("permission mode lock poisoned") = previous;
        }
    }

    /// Runs the decision pipeline for one tool invocation (spec.md §4.4):
    /// `auto` mode always allows; a cached decision wins next; `ask` mode
    /// auto-allows `read`; everything else prompts and blocks on a single
    /// input line, optionally caching an always/never answer.
    pub async fn check(
        &self,
        tool: &str,
        level: PermissionLevel,
        description: &str,
        sink: &dyn OutputSink,
        input: &dyn PermissionInput,
    ) -> Decision {
        if self.mode() == Mode::Auto {
            log::debug!("permission: auto-allowed '{tool}' (auto mode)");
            return Decision::Allow;
        }

        if let Some(cached) = self.cache.read().expect("permission cache lock poisoned").get(tool) {
            let decision = match cached {
                CachedDecision::AlwaysAllow => Decision::Allow,
                CachedDecision::NeverAllow => Decision::Deny,
            };
            log::debug!("permission: '{tool}' decided from cache ({decision:?})");
            return decision;
        }

        if self.mode() == Mode::Ask && level == PermissionLevel::Read {
            log::debug!("permission: auto-allowed '{tool}' (ask mode, read)");
            return Decision::Allow;
        }

        sink.send(SinkEvent::PermissionPrompt {
            tool: tool.to_string(),
            level,
            description: description.to_string(),
        });
        let answer = input.read_line().await;
        let decision = match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => Decision::Allow,
            "a" | "always" => {
                self.cache
                    .write()
                    .expect("permission cache lock poisoned")
                    .insert(tool.to_string(), CachedDecision::AlwaysAllow);
                Decision::Allow
            }
            "v" | "never" => {
                self.cache
                    .write()
                    .expect("permission cache lock poisoned")
                    .insert(tool.to_string(), CachedDecision::NeverAllow);
                Decision::Deny
            }
            // "n"/"no" and anything unrecognized denies once.
            _ => Decision::Deny,
        };
        log::info!("permission: '{tool}' decided by prompt ({decision:?})");
        decision
    }
}
