use thiserror::Error;

/// Failures surfaced by [`ToolRegistry::execute_tool`]. The orchestrator
/// converts every variant into an observation step; none of them abort a
/// run.
///
/// [`ToolRegistry::execute_tool`]: crate::agent::ToolRegistry::execute_tool
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool \"{0}\" not found")]
    NotFound(String),

    /// A registered descriptor with no wired executor, including the
    /// built-in workspace placeholders.
    #[error("tool \"{0}\" execution not implemented")]
    NotImplemented(String),

    /// A handler failure, propagated unchanged.
    #[error(transparent)]
    Execution(#[from] anyhow::Error),
}

/// Run-fatal conditions. Everything else (parse failures, tool failures)
/// is annotated on a step and the loop keeps going.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Model transport or credential failure. Reported on the step stream,
    /// never disguised as a synthetic step.
    #[error("model call failed: {0}")]
    ModelCall(#[source] anyhow::Error),

    #[error("run timed out after {timeout_ms}ms")]
    TimeoutExceeded { timeout_ms: u64 },

    /// Terminal status only; cancellation is not surfaced as a stream
    /// error to the caller.
    #[error("run cancelled")]
    Cancelled,
}
