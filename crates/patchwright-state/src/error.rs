//! Error types for patchwright-state

use thiserror::Error;

/// Errors returned by [`crate::ProjectStore`] implementations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection or namespace selection failed
    #[error("database connection failed: {0}")]
    Connection(String),

    /// Schema definition failed
    #[error("schema setup failed: {0}")]
    SchemaSetup(String),

    /// The backend rejected or failed a query
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A stored row could not be converted back into a domain record
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A digest string is not 64 lowercase hex characters
    #[error("invalid digest: {digest}")]
    InvalidDigest { digest: String },
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
