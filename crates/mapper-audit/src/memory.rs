//! In-memory audit storage (process lifetime only).

use async_trait::async_trait;
use mapper_types::{
    AuditEventRecord, AuditJournalFilter, AuditRecordId, AuditRecordStorage, AuditStoreError,
};
use tokio::sync::RwLock;

#[derive(Default)]
struct Journal {
    last_id: i64,
    records: Vec<AuditEventRecord>,
}

/// In-memory implementation of AuditRecordStorage.
pub struct InMemoryAuditRecordStorage {
    journal: RwLock<Journal>,
}

impl InMemoryAuditRecordStorage {
    pub fn new() -> Self {
        Self {
            journal: RwLock::new(Journal::default()),
        }
    }
}

impl Default for InMemoryAuditRecordStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditRecordStorage for InMemoryAuditRecordStorage {
    async fn add_audit_event(
        &self,
        mut record: AuditEventRecord,
    ) -> Result<AuditEventRecord, AuditStoreError> {
        let mut guard = self.journal.write().await;
        guard.last_id += 1;
        record.id = Some(AuditRecordId(guard.last_id));
        guard.records.push(record.clone());
        Ok(record)
    }

    async fn get_records(
        &self,
        filter: &AuditJournalFilter,
    ) -> Result<Vec<AuditEventRecord>, AuditStoreError> {
        let guard = self.journal.read().await;
        Ok(filter.apply(guard.records.iter().cloned()))
    }
}
