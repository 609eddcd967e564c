//! Categorized error type for the agent core.
//!
//! Every error carries a [`Category`], a stable [`Code`], an internal
//! `message` (for logs), an optional `user_message` (safe to show someone
//! who can't read a stack trace), a `retryable` bit, and an optional
//! `cause`. The resilient wrapper (`resilient.rs`) inspects `retryable` to
//! decide whether to retry transparently; everything else just surfaces
//! the category.

use std::fmt;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad error category, matching the failure domains a caller needs to
/// distinguish (is this the backend, a tool, the agent loop, config,
/// context, or a permission decision?).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Llm,
    Tool,
    Agent,
    Config,
    Context,
    Permission,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Llm => "llm",
            Category::Tool => "tool",
            Category::Agent => "agent",
            Category::Config => "config",
            Category::Context => "context",
            Category::Permission => "permission",
        };
        f.write_str(s)
    }
}

/// Stable error code. Names match the identifiers used in the
/// retryability rules: these are what a caller should `match` on, not the
/// `message` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    LlmUnavailable,
    LlmRequestFailed,
    LlmTimeout,
    LlmModelNotFound,
    ToolExecutionFailed,
    ToolNotFound,
    ToolPermissionDenied,
    ToolTimeout,
    MaxIterationsReached,
    PipelineStepFailed,
    Cancelled,
    ConfigLoadFailed,
    ContextWindowExceeded,
    PermissionDenied,
}

impl Code {
    /// The category this code belongs to.
    pub fn category(self) -> Category {
        match self {
            Code::LlmUnavailable
            | Code::LlmRequestFailed
            | Code::LlmTimeout
            | Code::LlmModelNotFound => Category::Llm,
            Code::ToolExecutionFailed | Code::ToolNotFound | Code::ToolTimeout => Category::Tool,
            Code::ToolPermissionDenied => Category::Permission,
            Code::MaxIterationsReached | Code::PipelineStepFailed | Code::Cancelled => {
                Category::Agent
            }
            Code::ConfigLoadFailed => Category::Config,
            Code::ContextWindowExceeded => Category::Context,
            Code::PermissionDenied => Category::Permission,
        }
    }

    /// Retryability absent a cause (used directly for codes whose
    /// retryability doesn't depend on an inner error).
    fn intrinsic_retryable(self) -> bool {
        matches!(
            self,
            Code::LlmUnavailable | Code::LlmRequestFailed | Code::LlmTimeout | Code::ToolTimeout
        )
    }
}

/// A categorized error.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct Error {
    code: Code,
    message: String,
    user_message: Option<String>,
    retryable: bool,
    #[source]
    cause: Option<Box<Error>>,
}

impl Error {
    fn new(code: Code, message: impl Into<String>) -> Self {
        let retryable = code.intrinsic_retryable();
        Self {
            code,
            message: message.into(),
            user_message: None,
            retryable,
            cause: None,
        }
    }

    /// Attach a user-facing message explaining what the user can do
    /// (e.g. `"run `ollama pull qwen3:8b`"`).
    pub fn with_user_message(mut self, msg: impl Into<String>) -> Self {
        self.user_message = Some(msg.into());
        self
    }

    /// Attach a cause. For `tool_execution_failed` and
    /// `pipeline_step_failed`, retryability is inherited from the cause
    /// per the propagation rules.
    pub fn with_cause(mut self, cause: Error) -> Self {
        if matches!(self.code, Code::ToolExecutionFailed | Code::PipelineStepFailed) {
            self.retryable = cause.retryable;
        }
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn category(&self) -> Category {
        self.code.category()
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn retryable(&self) -> bool {
        self.retryable
    }

    /// A message safe to surface to an end user. Falls back to the
    /// internal message when none was set explicitly.
    pub fn user_message(&self) -> &str {
        self.user_message.as_deref().unwrap_or(&self.message)
    }

    pub fn cause(&self) -> Option<&Error> {
        self.cause.as_deref()
    }

    // -- constructors, one per code --

    pub fn llm_unavailable(msg: impl Into<String>) -> Self {
        Self::new(Code::LlmUnavailable, msg)
    }

    pub fn llm_request_failed(msg: impl Into<String>) -> Self {
        Self::new(Code::LlmRequestFailed, msg)
    }

    pub fn llm_timeout() -> Self {
        Self::new(Code::LlmTimeout, "request to inference backend timed out")
    }

    pub fn llm_model_not_found(model: impl Into<String>) -> Self {
        let model = model.into();
        Self::new(Code::LlmModelNotFound, format!("model not found: {model}"))
            .with_user_message(format!("run `ollama pull {model}`"))
    }

    pub fn tool_execution_failed(tool: impl Into<String>, cause: Option<Error>) -> Self {
        let tool = tool.into();
        let err = Self::new(Code::ToolExecutionFailed, format!("tool '{tool}' failed"));
        match cause {
            Some(c) => err.with_cause(c),
            None => err,
        }
    }

    pub fn tool_not_found(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(Code::ToolNotFound, format!("no tool named '{name}'"))
    }

    pub fn tool_permission_denied(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(Code::ToolPermissionDenied, format!("permission denied for tool '{name}'"))
    }

    pub fn tool_timeout(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(Code::ToolTimeout, format!("tool '{name}' timed out"))
    }

    pub fn max_iterations_reached(max: usize) -> Self {
        Self::new(Code::MaxIterationsReached, format!("reached max iterations ({max})"))
    }

    pub fn pipeline_step_failed(step: impl Into<String>, cause: Option<Error>) -> Self {
        let step = step.into();
        let err = Self::new(Code::PipelineStepFailed, format!("step '{step}' failed"));
        match cause {
            Some(c) => err.with_cause(c),
            None => err,
        }
    }

    pub fn cancelled() -> Self {
        Self::new(Code::Cancelled, "operation cancelled")
    }

    pub fn config_load_failed(msg: impl Into<String>) -> Self {
        Self::new(Code::ConfigLoadFailed, msg)
    }

    pub fn context_window_exceeded(used: usize, window: usize) -> Self {
        Self::new(
            Code::ContextWindowExceeded,
            format!("context window exceeded: {used} tokens used of {window}"),
        )
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::new(Code::PermissionDenied, msg)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::llm_timeout()
        } else if e.is_connect() {
            Error::llm_unavailable(format!("backend unreachable: {e}"))
        } else {
            Error::llm_request_failed(format!("request failed: {e}"))
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::llm_request_failed(format!("malformed response: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_unavailable_is_retryable() {
        let e = Error::llm_unavailable("down");
        assert_eq!(e.category(), Category::Llm);
        assert!(e.retryable());
    }

    #[test]
    fn model_not_found_is_not_retryable() {
        let e = Error::llm_model_not_found("qwen3:8b");
        assert_eq!(e.code(), Code::LlmModelNotFound);
        assert!(!e.retryable());
        assert!(e.user_message().contains("ollama pull"));
    }

    #[test]
    fn tool_execution_failed_inherits_cause_retryability() {
        let cause = Error::llm_unavailable("down");
        let e = Error::tool_execution_failed("read_file", Some(cause));
        assert!(e.retryable());

        let cause = Error::llm_model_not_found("x");
        let e = Error::tool_execution_failed("read_file", Some(cause));
        assert!(!e.retryable());

        let e = Error::tool_execution_failed("read_file", None);
        assert!(!e.retryable());
    }

    #[test]
    fn pipeline_step_failed_inherits_cause_retryability() {
        let cause = Error::llm_timeout();
        let e = Error::pipeline_step_failed("step-1", Some(cause));
        assert!(e.retryable());
    }

    #[test]
    fn max_iterations_and_context_window_not_retryable() {
        assert!(!Error::max_iterations_reached(10).retryable());
        assert!(!Error::context_window_exceeded(100, 50).retryable());
    }

    #[test]
    fn permission_and_config_not_retryable() {
        assert!(!Error::permission_denied("no").retryable());
        assert!(!Error::config_load_failed("bad config").retryable());
    }

    #[test]
    fn cause_chain_via_source() {
        use std::error::Error as StdError;
        let cause = Error::llm_timeout();
        let e = Error::tool_execution_failed("t", Some(cause));
        assert!(e.source().is_some());
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: Error = json_err.into();
        assert_eq!(err.category(), Category::Llm);
    }
}
