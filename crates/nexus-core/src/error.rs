use thiserror::Error;

/// Top-level error type for the NexusFS orchestration stack.
///
/// Each variant corresponds to one failure class a task or an orchestrator
/// call can run into.
#[derive(Error, Debug)]
pub enum NexusError {
    /// Malformed or missing task parameters, detected before dispatch.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No agent is registered for the requested agent kind.
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// The agent does not implement the requested action.
    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    /// Agent-specific domain failure (missing path, copy failure, ...).
    #[error("Agent error: {0}")]
    Agent(String),

    /// Failure reported by an AI provider.
    #[error("Provider error: {0}")]
    Provider(String),

    /// The task exceeded its execution deadline (milliseconds).
    #[error("Task timed out after {0}ms")]
    Timeout(u64),

    /// A task state transition that the state machine forbids.
    #[error("Invalid task transition from {from} to {to}")]
    InvalidTransition {
        /// Status the task was in.
        from: String,
        /// Status that was requested.
        to: String,
    },

    /// The bounded task queue rejected a submission.
    #[error("Task queue is full (capacity {0})")]
    QueueFull(usize),

    /// A task reached a failed or cancelled terminal state.
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// Configuration parsing or validation failure.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`NexusError`].
pub type NexusResult<T> = Result<T, NexusError>;
