//! MappingService: the audited [`EntityMapper`] facade.

use crate::{LinkResolver, MappingManager};
use async_trait::async_trait;
use mapper_audit::AuditRecordBuilder;
use mapper_types::{
    AuditEventRecord, AuditJournal, AuditJournalFilter, AuditStoreError, EntityMapper,
    ImportReport, Initiator, Mapping, MappingEntry, MappingError, MappingId, MappingStore,
};
use std::sync::Arc;

/// Composes a [`MappingManager`] with an [`AuditJournal`].
///
/// Every successful create, update, and delete leaves exactly one audit record naming the
/// initiator. Audit persistence is not transactional with the mutation: a failed write is
/// logged and the mutation stands.
pub struct MappingService<S: ?Sized> {
    manager: MappingManager<S>,
    journal: Arc<dyn AuditJournal + Send + Sync>,
    records: AuditRecordBuilder,
}

impl<S> MappingService<S>
where
    S: MappingStore + ?Sized,
{
    pub fn new(store: Arc<S>, journal: Arc<dyn AuditJournal + Send + Sync>) -> Self {
        Self {
            manager: MappingManager::new(store),
            journal,
            records: AuditRecordBuilder::new(),
        }
    }

    pub fn manager(&self) -> &MappingManager<S> {
        &self.manager
    }

    pub fn resolver(&self) -> &LinkResolver<S> {
        self.manager.resolver()
    }

    pub async fn resolve_target_key(&self, key: &str) -> Result<String, MappingError> {
        self.manager.resolve_target_key(key).await
    }

    pub async fn get_mapped_value_or_else<E, F>(&self, key: &str, on_missing: F) -> Result<String, E>
    where
        F: FnOnce() -> E,
        E: From<MappingError>,
    {
        self.manager.get_mapped_value_or_else(key, on_missing).await
    }

    async fn persist_audit(&self, record: AuditEventRecord) {
        let event = record.event;
        let mapping_id = record.mapping_id;
        if let Err(e) = self.journal.record(record).await {
            tracing::warn!(
                event = %event,
                mapping_id = %mapping_id,
                error = %e,
                "failed to persist audit record"
            );
        }
    }
}

#[async_trait]
impl<S> EntityMapper for MappingService<S>
where
    S: MappingStore + ?Sized,
{
    async fn add_mapping(
        &self,
        initiator: &Initiator,
        key: &str,
        value: &str,
    ) -> Result<Mapping, MappingError> {
        let created = self.manager.add_mapping(key, value).await?;
        tracing::info!(initiator = %initiator, id = %created.id, key = %created.key, "mapping created");
        self.persist_audit(self.records.create_event(initiator, &created))
            .await;
        Ok(created)
    }

    async fn remove_mapping(&self, initiator: &Initiator, key: &str) -> Result<(), MappingError> {
        let Some(existing) = self.manager.get_mapping_by_key(key).await? else {
            tracing::debug!(initiator = %initiator, key = %key, "no mapping to remove");
            return Ok(());
        };
        self.persist_audit(self.records.delete_event(initiator, &existing))
            .await;
        self.manager.remove_mapping(key).await?;
        tracing::info!(initiator = %initiator, id = %existing.id, key = %key, "mapping removed");
        Ok(())
    }

    async fn update_mapping(
        &self,
        initiator: &Initiator,
        id: MappingId,
        key: &str,
        value: &str,
    ) -> Result<Mapping, MappingError> {
        let current = self
            .manager
            .get_mapping_by_id(id)
            .await?
            .ok_or(MappingError::NotFoundById(id))?;
        let updated = self.manager.update_mapping(id, key, value).await?;
        tracing::info!(
            initiator = %initiator,
            id = %id,
            old_key = %current.key,
            new_key = %updated.key,
            "mapping updated"
        );
        self.persist_audit(self.records.update_event(initiator, &current, &updated))
            .await;
        Ok(updated)
    }

    async fn get_mapping_by_id(&self, id: MappingId) -> Result<Option<Mapping>, MappingError> {
        self.manager.get_mapping_by_id(id).await
    }

    async fn get_mapping_by_key(&self, key: &str) -> Result<Option<Mapping>, MappingError> {
        self.manager.get_mapping_by_key(key).await
    }

    async fn get_mapped_value(&self, key: &str) -> Result<Option<String>, MappingError> {
        self.manager.get_mapped_value(key).await
    }

    async fn get_mapped_values(&self) -> Result<Vec<Mapping>, MappingError> {
        self.manager.get_mapped_values().await
    }

    async fn get_mapped_values_like(&self, prefix: &str) -> Result<Vec<Mapping>, MappingError> {
        self.manager.get_mapped_values_like(prefix).await
    }

    async fn is_mapping_present(&self, key: &str) -> Result<bool, MappingError> {
        self.manager.is_mapping_present(key).await
    }

    /// Entries with a blank key or a failed write are counted as failed and skipped.
    /// Entries whose value already matches are neither counted nor audited.
    async fn import_mappings(
        &self,
        initiator: &Initiator,
        entries: &[MappingEntry],
    ) -> Result<ImportReport, MappingError> {
        let mut report = ImportReport::default();
        for entry in entries {
            if entry.key.trim().is_empty() {
                report.failed += 1;
                continue;
            }
            let outcome = match self.manager.get_mapping_by_key(&entry.key).await {
                Ok(Some(existing)) if existing.value == entry.value => continue,
                Ok(Some(existing)) => self
                    .update_mapping(initiator, existing.id, &entry.key, &entry.value)
                    .await
                    .map(|_| false),
                Ok(None) => self
                    .add_mapping(initiator, &entry.key, &entry.value)
                    .await
                    .map(|_| true),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(true) => report.created += 1,
                Ok(false) => report.updated += 1,
                Err(e) => {
                    tracing::warn!(key = %entry.key, error = %e, "import entry skipped");
                    report.failed += 1;
                }
            }
        }
        tracing::info!(
            initiator = %initiator,
            created = report.created,
            updated = report.updated,
            failed = report.failed,
            "mappings imported"
        );
        Ok(report)
    }

    async fn get_audit_events(
        &self,
        filter: &AuditJournalFilter,
    ) -> Result<Vec<AuditEventRecord>, AuditStoreError> {
        self.journal.query(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapper_audit::{DefaultAuditJournal, InMemoryAuditRecordStorage};
    use mapper_store::InMemoryMappingStore;
    use mapper_types::AuditEventKind;

    fn service() -> MappingService<InMemoryMappingStore> {
        let journal = Arc::new(DefaultAuditJournal::new(Arc::new(
            InMemoryAuditRecordStorage::new(),
        )));
        MappingService::new(Arc::new(InMemoryMappingStore::new()), journal)
    }

    async fn events(svc: &MappingService<InMemoryMappingStore>) -> Vec<AuditEventRecord> {
        svc.get_audit_events(&AuditJournalFilter::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn chain_of_references_resolves() {
        let svc = service();
        let who = Initiator::new("admin");
        svc.add_mapping(&who, "A", "${B}").await.unwrap();
        svc.add_mapping(&who, "B", "${C}").await.unwrap();
        svc.add_mapping(&who, "C", "value").await.unwrap();
        assert_eq!(svc.get_mapped_value("A").await.unwrap().as_deref(), Some("value"));
        assert_eq!(svc.resolve_target_key("A").await.unwrap(), "C");
    }

    #[tokio::test]
    async fn dangling_reference() {
        let svc = service();
        let who = Initiator::new("admin");
        svc.add_mapping(&who, "X", "${Y}").await.unwrap();
        assert_eq!(svc.resolve_target_key("X").await.unwrap(), "Y");
        assert_eq!(svc.get_mapped_value("X").await.unwrap(), None);
    }

    #[tokio::test]
    async fn cycle_fails_from_both_ends() {
        let svc = service();
        let who = Initiator::new("admin");
        svc.add_mapping(&who, "P", "${Q}").await.unwrap();
        svc.add_mapping(&who, "Q", "${P}").await.unwrap();
        for start in ["P", "Q"] {
            let err = svc.get_mapped_value(start).await.unwrap_err();
            assert!(matches!(err, MappingError::Cycle(_)), "{start}: {err:?}");
        }
    }

    #[tokio::test]
    async fn duplicate_key_is_rejected_without_audit() {
        let svc = service();
        let who = Initiator::new("admin");
        svc.add_mapping(&who, "K1", "v1").await.unwrap();
        let err = svc.add_mapping(&who, "K1", "v2").await.unwrap_err();
        assert!(matches!(err, MappingError::Conflict(_)));
        assert_eq!(svc.get_mapped_value("K1").await.unwrap().as_deref(), Some("v1"));
        assert_eq!(events(&svc).await.len(), 1);
    }

    #[tokio::test]
    async fn update_onto_taken_key_conflicts() {
        let svc = service();
        let who = Initiator::new("admin");
        let k1 = svc.add_mapping(&who, "K1", "v1").await.unwrap();
        svc.add_mapping(&who, "K2", "v2").await.unwrap();

        svc.update_mapping(&who, k1.id, "K1", "v3").await.unwrap();
        assert_eq!(svc.get_mapped_value("K1").await.unwrap().as_deref(), Some("v3"));

        let err = svc.update_mapping(&who, k1.id, "K2", "x").await.unwrap_err();
        assert!(matches!(err, MappingError::Conflict(_)));
        assert_eq!(svc.get_mapped_value("K2").await.unwrap().as_deref(), Some("v2"));

        let err = svc
            .update_mapping(&who, MappingId(404), "new", "v")
            .await
            .unwrap_err();
        assert!(matches!(err, MappingError::NotFoundById(_)));
    }

    #[tokio::test]
    async fn remove_is_idempotent_and_audited_once() {
        let svc = service();
        let who = Initiator::new("admin");
        let created = svc.add_mapping(&who, "K", "v").await.unwrap();

        svc.remove_mapping(&who, "K").await.unwrap();
        svc.remove_mapping(&who, "K").await.unwrap();
        svc.remove_mapping(&who, "never").await.unwrap();
        assert!(!svc.is_mapping_present("K").await.unwrap());

        let recorded = events(&svc).await;
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].event, AuditEventKind::Delete);
        assert_eq!(recorded[0].mapping_id, created.id);
        assert_eq!(recorded[0].additional_info["key"], "K");
        assert_eq!(recorded[0].additional_info["value"], "v");
    }

    #[tokio::test]
    async fn each_mutation_leaves_one_record() {
        let svc = service();
        let alice = Initiator::new("alice");
        let bob = Initiator::new("bob");
        let m = svc.add_mapping(&alice, "k", "v1").await.unwrap();
        svc.update_mapping(&bob, m.id, "k2", "v2").await.unwrap();
        svc.remove_mapping(&alice, "k2").await.unwrap();

        let recorded = events(&svc).await;
        let kinds: Vec<_> = recorded.iter().map(|r| r.event).collect();
        assert_eq!(
            kinds,
            vec![AuditEventKind::Delete, AuditEventKind::Update, AuditEventKind::Create]
        );
        assert!(recorded.iter().all(|r| r.mapping_id == m.id));

        let update = &recorded[1];
        assert_eq!(update.initiator, bob);
        assert_eq!(update.additional_info["oldMapping.key"], "k");
        assert_eq!(update.additional_info["newMapping.value"], "v2");

        let by_alice = svc
            .get_audit_events(
                &AuditJournalFilter::builder()
                    .by_initiator("alice")
                    .build()
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(by_alice.len(), 2);
    }

    struct FailingJournal;

    #[async_trait]
    impl AuditJournal for FailingJournal {
        async fn record(
            &self,
            _event: AuditEventRecord,
        ) -> Result<AuditEventRecord, AuditStoreError> {
            Err(AuditStoreError::Other("disk full".into()))
        }

        async fn query(
            &self,
            _filter: &AuditJournalFilter,
        ) -> Result<Vec<AuditEventRecord>, AuditStoreError> {
            Err(AuditStoreError::Other("disk full".into()))
        }
    }

    #[tokio::test]
    async fn audit_failure_does_not_revert_mutation() {
        let svc = MappingService::new(
            Arc::new(InMemoryMappingStore::new()),
            Arc::new(FailingJournal),
        );
        let who = Initiator::new("admin");
        let m = svc.add_mapping(&who, "k", "v").await.unwrap();
        svc.update_mapping(&who, m.id, "k", "v2").await.unwrap();
        assert_eq!(svc.get_mapped_value("k").await.unwrap().as_deref(), Some("v2"));
        assert!(svc
            .get_audit_events(&AuditJournalFilter::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn import_upserts_by_key() {
        let svc = service();
        let who = Initiator::new("importer");
        svc.add_mapping(&who, "same", "1").await.unwrap();
        svc.add_mapping(&who, "changed", "old").await.unwrap();
        svc.add_mapping(&who, "untouched", "keep").await.unwrap();

        let report = svc
            .import_mappings(
                &who,
                &[
                    MappingEntry::new("same", "1"),
                    MappingEntry::new("changed", "new"),
                    MappingEntry::new("fresh", "${same}"),
                    MappingEntry::new("  ", "blank"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(
            report,
            ImportReport {
                created: 1,
                updated: 1,
                failed: 1
            }
        );
        assert_eq!(svc.get_mapped_value("changed").await.unwrap().as_deref(), Some("new"));
        assert_eq!(svc.get_mapped_value("fresh").await.unwrap().as_deref(), Some("1"));
        assert_eq!(svc.get_mapped_value("untouched").await.unwrap().as_deref(), Some("keep"));
        assert_eq!(events(&svc).await.len(), 5);
    }

    #[tokio::test]
    async fn or_else_delegates() {
        let svc = service();
        let r: Result<String, MappingError> = svc
            .get_mapped_value_or_else("missing", || MappingError::NotFoundByKey("missing".into()))
            .await;
        assert!(matches!(r, Err(MappingError::NotFoundByKey(ref k)) if k == "missing"));
    }
}
