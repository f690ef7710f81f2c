//! Default audit journal: a thin layer over an [`AuditRecordStorage`].

use async_trait::async_trait;
use mapper_types::{
    AuditEventRecord, AuditJournal, AuditJournalFilter, AuditRecordStorage, AuditStoreError,
};
use std::sync::Arc;

pub struct DefaultAuditJournal {
    storage: Arc<dyn AuditRecordStorage + Send + Sync>,
}

impl DefaultAuditJournal {
    pub fn new(storage: Arc<dyn AuditRecordStorage + Send + Sync>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl AuditJournal for DefaultAuditJournal {
    async fn record(&self, event: AuditEventRecord) -> Result<AuditEventRecord, AuditStoreError> {
        let saved = self.storage.add_audit_event(event).await?;
        tracing::debug!(
            audit_id = ?saved.id,
            event = %saved.event,
            mapping_id = %saved.mapping_id,
            "audit record persisted"
        );
        Ok(saved)
    }

    async fn query(
        &self,
        filter: &AuditJournalFilter,
    ) -> Result<Vec<AuditEventRecord>, AuditStoreError> {
        self.storage.get_records(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AuditRecordBuilder, InMemoryAuditRecordStorage};
    use mapper_types::{AuditEventKind, Initiator, Mapping, MappingId};

    #[tokio::test]
    async fn record_assigns_ids_and_query_returns_newest_first() {
        let journal = DefaultAuditJournal::new(Arc::new(InMemoryAuditRecordStorage::new()));
        let who = Initiator::new("admin");
        let builder = AuditRecordBuilder::new();
        let m = Mapping::new(MappingId(1), "k", "v");

        let first = journal.record(builder.create_event(&who, &m)).await.unwrap();
        let second = journal.record(builder.delete_event(&who, &m)).await.unwrap();
        assert!(first.id.is_some());
        assert!(second.id > first.id);

        let events = journal.query(&AuditJournalFilter::default()).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, AuditEventKind::Delete);
        assert_eq!(events[1].event, AuditEventKind::Create);
    }
}
