//! Tool selector (H): a pure, side-effect-free function that prunes the
//! `tools` field sent to the backend down to what a query is likely to
//! need, keeping prompts small and model attention focused.
//!
//! Grounded in the teacher's flat tool list (`tools.rs`'s `ToolRegistry`)
//! the same way the rest of this crate is — this module adds nothing
//! stateful, just a keyword allowlist per category and a substring match.

use crate::tools::{Tool, ToolRegistry};

/// Tool names always included, regardless of the query.
const CORE_TOOLS: &[&str] = &["read_file", "list_files", "search_files"];

/// Per-category keyword allowlists. A category's tools are included if the
/// query contains any of its keywords (case-insensitive substring match).
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("git", &["git", "commit", "branch", "merge", "rebase", "diff", "pull request", "pr "]),
    ("write", &["write", "edit", "create", "modify", "update", "refactor", "fix", "add", "delete", "remove"]),
    ("execute", &["run", "execute", "build", "compile", "test", "install", "shell", "command"]),
    ("web", &["http", "url", "web", "fetch", "download", "api", "browse"]),
    ("dev", &["debug", "lint", "format", "profile", "benchmark", "trace"]),
    ("memory", &["remember", "recall", "memory", "skill", "note", "preference"]),
];

const CATEGORY_TOOL_NAMES: &[(&str, &[&str])] = &[
    ("git", &["git_status", "git_diff", "git_commit", "git_log", "git_branch"]),
    ("write", &["write_file", "edit_file", "delete_file"]),
    ("execute", &["run_command", "run_tests", "build_project"]),
    ("web", &["fetch_url", "web_search"]),
    ("dev", &["lint_code", "format_code"]),
    ("memory", &["save_memory", "recall_memory", "load_skill"]),
];

/// Selects the subset of `registry`'s tools relevant to `query`: every core
/// tool plus any category whose keyword allowlist the query matches. A
/// registry with none of the named tools registered simply contributes
/// nothing for that category — this function never invents tools.
pub fn select_tools<'a>(registry: &'a ToolRegistry, query: &str) -> Vec<&'a Tool> {
    let query_lower = query.to_lowercase();
    let mut names: Vec<&str> = CORE_TOOLS.to_vec();

    for (category, keywords) in CATEGORY_KEYWORDS {
        if keywords.iter().any(|kw| query_lower.contains(kw)) {
            if let Some((_, tool_names)) = CATEGORY_TOOL_NAMES.iter().find(|(c, _)| c == category) {
                names.extend(*tool_names);
            }
        }
    }

    registry
        .list()
        .into_iter()
        .filter(|t| names.contains(&t.name()))
        .collect()
}
