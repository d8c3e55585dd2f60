//! In-memory project store
//!
//! `MemoryProjectStore` satisfies the [`ProjectStore`] contract without any
//! external dependency. The daemon uses it when no database URL is set.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::storage_traits::*;

type FileKey = (String, String);

#[derive(Debug, Default)]
struct Inner {
    files: HashMap<FileKey, FileRecord>,
    memory: HashMap<FileKey, Vec<String>>,
    audits: Vec<RepairAuditRecord>,
}

/// In-memory [`ProjectStore`] backed by hash maps behind a mutex.
#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    inner: Mutex<Inner>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn key(project_id: &str, filename: &str) -> FileKey {
    (project_id.to_string(), filename.to_string())
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn upsert_file(
        &self,
        project_id: &str,
        filename: &str,
        content: &str,
    ) -> StorageResult<FileRecord> {
        let record = FileRecord::new(project_id, filename, content);
        self.lock()
            .files
            .insert(key(project_id, filename), record.clone());
        Ok(record)
    }

    async fn read_file(
        &self,
        project_id: &str,
        filename: &str,
    ) -> StorageResult<Option<FileRecord>> {
        Ok(self.lock().files.get(&key(project_id, filename)).cloned())
    }

    async fn load_memory(&self, project_id: &str, filename: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .lock()
            .memory
            .get(&key(project_id, filename))
            .cloned()
            .unwrap_or_default())
    }

    async fn save_memory(
        &self,
        project_id: &str,
        filename: &str,
        entries: Vec<String>,
    ) -> StorageResult<()> {
        self.lock()
            .memory
            .insert(key(project_id, filename), bound_memory(entries));
        Ok(())
    }

    async fn append_audit(&self, record: RepairAuditRecord) -> StorageResult<()> {
        self.lock().audits.push(record);
        Ok(())
    }

    async fn list_audits(
        &self,
        project_id: &str,
        filename: &str,
    ) -> StorageResult<Vec<RepairAuditRecord>> {
        Ok(self
            .lock()
            .audits
            .iter()
            .filter(|a| a.project_id == project_id && a.filename == filename)
            .cloned()
            .collect())
    }
}
