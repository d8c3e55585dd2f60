//! Error types for the sandbox module.

use crate::tools::ToolError;

/// Errors produced by the sandbox layer.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("module `{specifier}` denied: {reason}")]
    PolicyDenied { specifier: String, reason: String },

    #[error("module execution timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    /// The module ran and threw.
    #[error("module evaluation failed: {message}")]
    Evaluation { message: String },

    /// The runner misbehaved (bad output, crashed, protocol mismatch).
    #[error("runner failed after {attempts} attempt(s): {reason}")]
    ExecutionFailed { attempts: u32, reason: String },

    #[error("runner unavailable: {0}")]
    RunnerUnavailable(String),

    #[error(
        "circuit breaker open: {consecutive_failures} consecutive failures (threshold {threshold})"
    )]
    CircuitBreakerOpen {
        consecutive_failures: u32,
        threshold: u32,
    },

    /// The module uses an API the sandbox refuses to execute.
    #[error("execution refused: module uses `{pattern}` (line {line})")]
    HazardRefused { pattern: String, line: u32 },

    /// The compiled module could not be rewritten into its closed form.
    #[error("module rewrite failed: {0}")]
    Rewrite(String),

    #[error("invalid sandbox configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Failures that degrade to the unexecuted preview instead of an error.
    pub fn is_degraded(&self) -> bool {
        !matches!(self, SandboxError::Evaluation { .. })
    }
}

impl From<ToolError> for SandboxError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Unavailable { reason, .. } => SandboxError::RunnerUnavailable(reason),
            ToolError::Timeout { timeout_ms, .. } => SandboxError::Timeout {
                limit_ms: timeout_ms,
            },
            ToolError::Rejected { message, .. } => SandboxError::Evaluation { message },
            ToolError::Protocol { reason, .. } => SandboxError::ExecutionFailed {
                attempts: 1,
                reason,
            },
            ToolError::Http(reason) => SandboxError::ExecutionFailed {
                attempts: 1,
                reason,
            },
            ToolError::Io(err) => SandboxError::Io(err),
        }
    }
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
