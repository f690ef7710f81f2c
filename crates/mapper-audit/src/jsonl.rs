//! JSONL file-backed audit storage (persists across restarts).

use async_trait::async_trait;
use mapper_types::{
    AuditEventRecord, AuditJournalFilter, AuditRecordId, AuditRecordStorage, AuditStoreError,
};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// One JSON record per line. Appends are serialised; the lock also caches the last id so
/// the file is scanned only once per process.
pub struct JsonlAuditRecordStorage {
    path: PathBuf,
    append_lock: tokio::sync::Mutex<Option<i64>>,
}

impl JsonlAuditRecordStorage {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            append_lock: tokio::sync::Mutex::new(None),
        }
    }

    async fn read_all(&self) -> Result<Vec<AuditEventRecord>, AuditStoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AuditStoreError::Other(e.to_string())),
        };
        let mut out = Vec::new();
        for (n, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(rec) => out.push(rec),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), line = n + 1, error = %e, "skipping unreadable audit line")
                }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl AuditRecordStorage for JsonlAuditRecordStorage {
    async fn add_audit_event(
        &self,
        mut record: AuditEventRecord,
    ) -> Result<AuditEventRecord, AuditStoreError> {
        let mut last_id = self.append_lock.lock().await;
        let prev = match *last_id {
            Some(id) => id,
            None => self
                .read_all()
                .await?
                .iter()
                .filter_map(|r| r.id.map(|id| id.0))
                .max()
                .unwrap_or(0),
        };
        record.id = Some(AuditRecordId(prev + 1));

        let line =
            serde_json::to_string(&record).map_err(|e| AuditStoreError::Other(e.to_string()))?;
        let mut f = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| AuditStoreError::Other(e.to_string()))?;
        f.write_all(format!("{}\n", line).as_bytes())
            .await
            .map_err(|e| AuditStoreError::Other(e.to_string()))?;
        f.flush()
            .await
            .map_err(|e| AuditStoreError::Other(e.to_string()))?;

        *last_id = Some(prev + 1);
        Ok(record)
    }

    async fn get_records(
        &self,
        filter: &AuditJournalFilter,
    ) -> Result<Vec<AuditEventRecord>, AuditStoreError> {
        Ok(filter.apply(self.read_all().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuditRecordBuilder;
    use mapper_types::{AuditEventKind, Initiator, Mapping, MappingId};

    #[tokio::test]
    async fn ids_continue_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let who = Initiator::new("admin");
        let m = Mapping::new(MappingId(1), "k", "v");
        {
            let storage = JsonlAuditRecordStorage::new(&path);
            let a = storage
                .add_audit_event(AuditRecordBuilder::new().create_event(&who, &m))
                .await
                .unwrap();
            assert_eq!(a.id, Some(AuditRecordId(1)));
        }

        let storage = JsonlAuditRecordStorage::new(&path);
        let b = storage
            .add_audit_event(AuditRecordBuilder::new().delete_event(&who, &m))
            .await
            .unwrap();
        assert_eq!(b.id, Some(AuditRecordId(2)));

        let filter = AuditJournalFilter::builder()
            .by_event(AuditEventKind::Create)
            .build()
            .unwrap();
        let records = storage.get_records(&filter).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].additional_info["key"], "k");
    }

    #[tokio::test]
    async fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonlAuditRecordStorage::new(dir.path().join("none.jsonl"));
        let records = storage.get_records(&AuditJournalFilter::default()).await.unwrap();
        assert!(records.is_empty());
    }
}
