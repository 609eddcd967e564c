//! Base URL normalization for the inference backend.
//!
//! Loading configuration from files or environment variables is out of
//! scope for this crate (SPEC_FULL.md §1) — the core always receives an
//! already-resolved [`crate::types::Config`]. What *is* in scope is
//! normalizing the base URL the caller hands in, the way a local Ollama
//! install is commonly addressed: a bare host with no scheme, or a
//! wildcard bind address meant for the server side rather than a client.

/// Default port Ollama listens on.
const DEFAULT_PORT: u16 = 11434;

/// Normalize a base URL for client use.
///
/// - A bare host (no `http://`/`https://` prefix) is given `http://` and,
///   if it carries no port of its own, the default Ollama port.
/// - A wildcard bind address `0.0.0.0` (with or without a port) is
///   rewritten to `localhost`, since `0.0.0.0` is meaningful as a server
///   bind address but not as something a client can connect to.
///
/// # Examples
///
/// ```
/// use open_agent_core::config::normalize_base_url;
///
/// assert_eq!(normalize_base_url("localhost"), "http://localhost:11434");
/// assert_eq!(normalize_base_url("myhost:9000"), "http://myhost:9000");
/// assert_eq!(normalize_base_url("0.0.0.0:11434"), "http://localhost:11434");
/// assert_eq!(normalize_base_url("http://0.0.0.0"), "http://localhost:11434");
/// assert_eq!(
///     normalize_base_url("http://localhost:11434"),
///     "http://localhost:11434"
/// );
/// ```
pub fn normalize_base_url(input: &str) -> String {
    let trimmed = input.trim().trim_end_matches('/');

    let (scheme, rest) = if let Some(rest) = trimmed.strip_prefix("https://") {
        ("https", rest)
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        ("http", rest)
    } else {
        ("http", trimmed)
    };

    let (host, port) = match rest.split_once(':') {
        Some((h, p)) => (h, Some(p)),
        None => (rest, None),
    };

    let host = if host.is_empty() || host == "0.0.0.0" {
        "localhost"
    } else {
        host
    };

    match port {
        Some(p) => format!("{scheme}://{host}:{p}"),
        None => format!("{scheme}://{host}:{DEFAULT_PORT}"),
    }
}
