//! SurrealDB-backed ProjectStore implementation
//!
//! Uses the row types in `schema`, converting to and from `storage_traits`
//! records at the boundary. Upserts are a delete followed by a create inside
//! one query so the unique `(project_id, filename)` index never trips.

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::handle::SurrealHandle;
use crate::schema::{AuditRow, FileRow, MemoryRow};
use crate::storage_traits::{
    bound_memory, FileRecord, ProjectStore, RepairAuditRecord, StorageResult,
};

/// SurrealDB-backed implementation of [`ProjectStore`].
#[derive(Clone)]
pub struct SurrealProjectStore {
    handle: SurrealHandle,
}

impl SurrealProjectStore {
    pub fn new(handle: SurrealHandle) -> Self {
        Self { handle }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> StorageResult<Self> {
        Ok(Self::new(SurrealHandle::setup_db().await?))
    }
}

#[async_trait]
impl ProjectStore for SurrealProjectStore {
    async fn upsert_file(
        &self,
        project_id: &str,
        filename: &str,
        content: &str,
    ) -> StorageResult<FileRecord> {
        let record = FileRecord::new(project_id, filename, content);
        debug!(project_id, filename, digest = %record.digest.short(), "upserting file");

        let mut res = self
            .handle
            .db()
            .query("DELETE project_files WHERE project_id = $pid AND filename = $file")
            .query("CREATE project_files CONTENT $row")
            .bind(("pid", project_id.to_string()))
            .bind(("file", filename.to_string()))
            .bind(("row", FileRow::from(&record)))
            .await?;
        let _created: Vec<FileRow> = res.take(1)?;
        Ok(record)
    }

    async fn read_file(
        &self,
        project_id: &str,
        filename: &str,
    ) -> StorageResult<Option<FileRecord>> {
        let mut res = self
            .handle
            .db()
            .query("SELECT * FROM project_files WHERE project_id = $pid AND filename = $file")
            .bind(("pid", project_id.to_string()))
            .bind(("file", filename.to_string()))
            .await?;
        let rows: Vec<FileRow> = res.take(0)?;
        rows.into_iter().next().map(FileRow::into_record).transpose()
    }

    async fn load_memory(&self, project_id: &str, filename: &str) -> StorageResult<Vec<String>> {
        let mut res = self
            .handle
            .db()
            .query("SELECT * FROM repair_memory WHERE project_id = $pid AND filename = $file")
            .bind(("pid", project_id.to_string()))
            .bind(("file", filename.to_string()))
            .await?;
        let rows: Vec<MemoryRow> = res.take(0)?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| row.entries)
            .unwrap_or_default())
    }

    async fn save_memory(
        &self,
        project_id: &str,
        filename: &str,
        entries: Vec<String>,
    ) -> StorageResult<()> {
        let row = MemoryRow {
            project_id: project_id.to_string(),
            filename: filename.to_string(),
            entries: bound_memory(entries),
            updated_at: Utc::now(),
        };
        let mut res = self
            .handle
            .db()
            .query("DELETE repair_memory WHERE project_id = $pid AND filename = $file")
            .query("CREATE repair_memory CONTENT $row")
            .bind(("pid", project_id.to_string()))
            .bind(("file", filename.to_string()))
            .bind(("row", row))
            .await?;
        let _created: Vec<MemoryRow> = res.take(1)?;
        Ok(())
    }

    async fn append_audit(&self, record: RepairAuditRecord) -> StorageResult<()> {
        let _created: Option<AuditRow> = self
            .handle
            .db()
            .create("repair_audits")
            .content(AuditRow::from(record))
            .await?;
        Ok(())
    }

    async fn list_audits(
        &self,
        project_id: &str,
        filename: &str,
    ) -> StorageResult<Vec<RepairAuditRecord>> {
        let mut res = self
            .handle
            .db()
            .query(
                "SELECT * FROM repair_audits WHERE project_id = $pid AND filename = $file \
                 ORDER BY created_at ASC",
            )
            .bind(("pid", project_id.to_string()))
            .bind(("file", filename.to_string()))
            .await?;
        let rows: Vec<AuditRow> = res.take(0)?;
        rows.into_iter().map(AuditRow::into_record).collect()
    }
}
