//! Domain-level error taxonomy for Patchwright.
//!
//! Validation findings are never raised: they travel as `Vec<Diagnostic>`.
//! Collaborator failures use `ToolError` (tools), execution failures use
//! `SandboxError` (sandbox) and compile-service failures use `CompileError`.

use patchwright_state::StorageError;

/// Patchwright domain errors.
#[derive(Debug, thiserror::Error)]
pub enum PatchwrightError {
    /// The request is missing required input and cannot be processed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A file was requested from the project store but does not exist.
    #[error("file not found: {project_id}/{filename}")]
    FileNotFound {
        project_id: String,
        filename: String,
    },

    /// Model output could not be turned into structured data.
    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Patchwright domain operations.
pub type Result<T> = std::result::Result<T, PatchwrightError>;
