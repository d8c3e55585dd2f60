//! Storage trait definitions for Patchwright
//!
//! `ProjectStore` is the single persistence seam of the repair loop:
//! - file contents keyed by `(project_id, filename)`
//! - bounded repair memory per file (free-text fix summaries)
//! - an append-only audit trail of repair runs
//!
//! The trait is async and backend-agnostic. An in-memory implementation lives
//! in the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Maximum number of repair-memory entries kept per file.
pub const MAX_MEMORY_ENTRIES: usize = 12;

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private so the string is always lowercase hex produced
/// by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Latest stored content of one project file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub project_id: String,
    pub filename: String,
    pub content: String,
    /// Digest of `content`
    pub digest: ContentDigest,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn new(
        project_id: impl Into<String>,
        filename: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        Self {
            project_id: project_id.into(),
            filename: filename.into(),
            digest: ContentDigest::from_bytes(content.as_bytes()),
            content,
            updated_at: Utc::now(),
        }
    }
}

/// One finished repair run, as written to the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairAuditRecord {
    pub project_id: String,
    pub filename: String,
    /// Passes performed by the loop
    pub passes: u32,
    /// Error diagnostics left on the final source
    pub final_error_count: u32,
    /// Provenance tag of the accepted source (e.g. "ai-repair", "catalog")
    pub provenance: String,
    pub created_at: DateTime<Utc>,
}

/// Trim `entries` to the newest [`MAX_MEMORY_ENTRIES`], dropping oldest first.
pub fn bound_memory(mut entries: Vec<String>) -> Vec<String> {
    if entries.len() > MAX_MEMORY_ENTRIES {
        let excess = entries.len() - MAX_MEMORY_ENTRIES;
        entries.drain(..excess);
    }
    entries
}

// ---------------------------------------------------------------------------
// ProjectStore
// ---------------------------------------------------------------------------

/// Persistent project storage used by the repair loop in persisted mode.
///
/// Guarantees:
/// - `upsert_file` followed by `read_file` returns the same content.
/// - `save_memory` keeps at most [`MAX_MEMORY_ENTRIES`] entries, newest last.
/// - `list_audits` returns records oldest first.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Insert or replace the content of `(project_id, filename)`.
    async fn upsert_file(
        &self,
        project_id: &str,
        filename: &str,
        content: &str,
    ) -> StorageResult<FileRecord>;

    /// Read the content of `(project_id, filename)`, `None` if absent.
    async fn read_file(&self, project_id: &str, filename: &str)
        -> StorageResult<Option<FileRecord>>;

    /// Load the repair memory of a file. Empty if nothing was saved.
    async fn load_memory(&self, project_id: &str, filename: &str) -> StorageResult<Vec<String>>;

    /// Replace the repair memory of a file, bounded oldest-first.
    async fn save_memory(
        &self,
        project_id: &str,
        filename: &str,
        entries: Vec<String>,
    ) -> StorageResult<()>;

    /// Append one audit record.
    async fn append_audit(&self, record: RepairAuditRecord) -> StorageResult<()>;

    /// List the audit records of a file, oldest first.
    async fn list_audits(
        &self,
        project_id: &str,
        filename: &str,
    ) -> StorageResult<Vec<RepairAuditRecord>>;
}
