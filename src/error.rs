use std::time::Duration;

/// Everything that can terminate a single tool call.
///
/// Each variant is captured locally and converted into a failed
/// [`ToolResult`](crate::tools::ToolResult) — the dispatch loop never
/// aborts a batch because one call failed.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Tool family switched off in the resolved policy.
    #[error("disabled by policy")]
    PolicyDenied,

    /// The approval gate returned a negative decision.
    #[error("denied by user")]
    ApprovalDenied,

    /// Args were not valid JSON where JSON is required, or a required
    /// field was missing or empty.
    #[error("{0}")]
    MalformedArgs(String),

    /// Absolute path, traversal, or a resolved path escaping the workspace.
    #[error("{0}")]
    PathViolation(String),

    /// A file, archive, or total-bytes cap was exceeded. Output truncation
    /// is not an error and never maps here.
    #[error("{0}")]
    ResourceLimitExceeded(String),

    /// Sandboxing is required but the wrapper binary cannot be located.
    /// Fails the call — there is no unsandboxed fallback.
    #[error("{0}")]
    SandboxUnavailable(String),

    /// Wall-clock timeout fired; the process was killed and reaped.
    #[error("timeout after {0:?}")]
    ProcessTimeout(Duration),

    /// Nonzero exit or spawn failure.
    #[error("{0}")]
    ProcessFailure(String),

    #[error("unknown tool")]
    UnknownTool,

    /// Exec or skill-exec feature globally off.
    #[error("{0}")]
    FeatureDisabled(String),

    /// Anything else a handler surfaced (I/O, store errors).
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for ToolError {
    fn from(e: anyhow::Error) -> Self {
        ToolError::Other(e.to_string())
    }
}

impl From<std::io::Error> for ToolError {
    fn from(e: std::io::Error) -> Self {
        ToolError::Other(e.to_string())
    }
}

/// A handler failure carrying whatever partial output was produced
/// before the error (e.g. stdout captured before a timeout).
#[derive(Debug)]
pub struct ToolFailure {
    pub error: ToolError,
    pub output: String,
}

impl ToolFailure {
    pub fn with_output(error: ToolError, output: impl Into<String>) -> Self {
        Self { error, output: output.into() }
    }
}

impl From<ToolError> for ToolFailure {
    fn from(error: ToolError) -> Self {
        Self { error, output: String::new() }
    }
}

/// Handler return type: success output, or a failure with optional
/// partial output.
pub type HandlerResult = Result<String, ToolFailure>;
