//! SurrealDB row types and schema definition
//!
//! Rows mirror the domain records in `storage_traits` but store timestamps as
//! SurrealDB datetimes. Conversion happens at the store boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::{ContentDigest, FileRecord, RepairAuditRecord, StorageResult};

/// Tables written by [`crate::SurrealProjectStore`].
pub(crate) const SCHEMA: &str = r#"
    -- Latest content per project file
    DEFINE TABLE project_files SCHEMAFULL;
    DEFINE FIELD project_id ON project_files TYPE string;
    DEFINE FIELD filename ON project_files TYPE string;
    DEFINE FIELD content ON project_files TYPE string;
    DEFINE FIELD digest ON project_files TYPE string;
    DEFINE FIELD updated_at ON project_files TYPE datetime;
    DEFINE INDEX idx_project_file ON project_files FIELDS project_id, filename UNIQUE;

    -- Bounded repair memory per project file
    DEFINE TABLE repair_memory SCHEMAFULL;
    DEFINE FIELD project_id ON repair_memory TYPE string;
    DEFINE FIELD filename ON repair_memory TYPE string;
    DEFINE FIELD entries ON repair_memory TYPE array<string>;
    DEFINE FIELD updated_at ON repair_memory TYPE datetime;
    DEFINE INDEX idx_memory_file ON repair_memory FIELDS project_id, filename UNIQUE;

    -- Append-only repair audit trail
    DEFINE TABLE repair_audits SCHEMAFULL;
    DEFINE FIELD project_id ON repair_audits TYPE string;
    DEFINE FIELD filename ON repair_audits TYPE string;
    DEFINE FIELD passes ON repair_audits TYPE int;
    DEFINE FIELD final_error_count ON repair_audits TYPE int;
    DEFINE FIELD provenance ON repair_audits TYPE string;
    DEFINE FIELD created_at ON repair_audits TYPE datetime;
    DEFINE INDEX idx_audit_file ON repair_audits FIELDS project_id, filename;
"#;

/// Serialize chrono timestamps as SurrealDB datetimes
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serde::Serialize::serialize(&SurrealDatetime::from(*date), serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(DateTime::from(SurrealDatetime::deserialize(deserializer)?))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FileRow {
    pub project_id: String,
    pub filename: String,
    pub content: String,
    pub digest: String,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl From<&FileRecord> for FileRow {
    fn from(record: &FileRecord) -> Self {
        Self {
            project_id: record.project_id.clone(),
            filename: record.filename.clone(),
            content: record.content.clone(),
            digest: record.digest.as_str().to_string(),
            updated_at: record.updated_at,
        }
    }
}

impl FileRow {
    pub fn into_record(self) -> StorageResult<FileRecord> {
        Ok(FileRecord {
            project_id: self.project_id,
            filename: self.filename,
            content: self.content,
            digest: ContentDigest::try_from(self.digest)?,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct MemoryRow {
    pub project_id: String,
    pub filename: String,
    pub entries: Vec<String>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AuditRow {
    pub project_id: String,
    pub filename: String,
    pub passes: i64,
    pub final_error_count: i64,
    pub provenance: String,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<RepairAuditRecord> for AuditRow {
    fn from(record: RepairAuditRecord) -> Self {
        Self {
            project_id: record.project_id,
            filename: record.filename,
            passes: i64::from(record.passes),
            final_error_count: i64::from(record.final_error_count),
            provenance: record.provenance,
            created_at: record.created_at,
        }
    }
}

impl AuditRow {
    pub fn into_record(self) -> StorageResult<RepairAuditRecord> {
        let count = |v: i64, field: &str| {
            u32::try_from(v)
                .map_err(|_| StorageError::Serialization(format!("{field} out of range: {v}")))
        };
        Ok(RepairAuditRecord {
            passes: count(self.passes, "passes")?,
            final_error_count: count(self.final_error_count, "final_error_count")?,
            project_id: self.project_id,
            filename: self.filename,
            provenance: self.provenance,
            created_at: self.created_at,
        })
    }
}
