//! Traits for the mapping store, audit storage, and the public mapper facade.

use crate::{
    AuditEventRecord, AuditJournalFilter, ImportReport, Initiator, Mapping, MappingEntry,
    MappingId,
};
use async_trait::async_trait;

/// Unvalidated CRUD over mapping records.
///
/// Implementations perform no existence or uniqueness pre-checks of their own beyond what
/// their backing storage enforces; a violated unique key surfaces as
/// [`MappingStoreError::Conflict`]. Every read returns independent copies.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Create a mapping and assign it a fresh id.
    async fn create(&self, key: &str, value: &str) -> Result<Mapping, MappingStoreError>;

    /// Delete the mapping for `key`; no-op if absent.
    async fn delete(&self, key: &str) -> Result<(), MappingStoreError>;

    /// Replace key and value of the mapping with the given id.
    async fn update_by_id(
        &self,
        id: MappingId,
        new_key: &str,
        new_value: &str,
    ) -> Result<Mapping, MappingStoreError>;

    /// All mappings, ordered by id.
    async fn get_all(&self) -> Result<Vec<Mapping>, MappingStoreError>;

    /// Mappings whose key starts with `prefix`, ordered by id.
    async fn get_by_key_prefix(&self, prefix: &str) -> Result<Vec<Mapping>, MappingStoreError>;

    async fn get_by_key(&self, key: &str) -> Result<Option<Mapping>, MappingStoreError>;

    async fn get_by_id(&self, id: MappingId) -> Result<Option<Mapping>, MappingStoreError>;
}

/// Persistence collaborator for audit records.
#[async_trait]
pub trait AuditRecordStorage: Send + Sync {
    /// Persist the record and return it with its assigned id.
    async fn add_audit_event(
        &self,
        record: AuditEventRecord,
    ) -> Result<AuditEventRecord, AuditStoreError>;

    /// Matching records, newest first, at most `filter.max_results()`.
    async fn get_records(
        &self,
        filter: &AuditJournalFilter,
    ) -> Result<Vec<AuditEventRecord>, AuditStoreError>;
}

/// Append-only journal of mapping mutations.
#[async_trait]
pub trait AuditJournal: Send + Sync {
    async fn record(&self, event: AuditEventRecord) -> Result<AuditEventRecord, AuditStoreError>;

    async fn query(
        &self,
        filter: &AuditJournalFilter,
    ) -> Result<Vec<AuditEventRecord>, AuditStoreError>;
}

/// Public mapper contract for collaborators (REST layer, workflow hooks, ...).
///
/// Callers are responsible for authorization before invoking any mutation.
#[async_trait]
pub trait EntityMapper: Send + Sync {
    async fn add_mapping(
        &self,
        initiator: &Initiator,
        key: &str,
        value: &str,
    ) -> Result<Mapping, MappingError>;

    /// Idempotent: removing an absent key neither fails nor leaves an audit record.
    async fn remove_mapping(&self, initiator: &Initiator, key: &str) -> Result<(), MappingError>;

    async fn update_mapping(
        &self,
        initiator: &Initiator,
        id: MappingId,
        key: &str,
        value: &str,
    ) -> Result<Mapping, MappingError>;

    async fn get_mapping_by_id(&self, id: MappingId) -> Result<Option<Mapping>, MappingError>;

    async fn get_mapping_by_key(&self, key: &str) -> Result<Option<Mapping>, MappingError>;

    /// Value at the end of the indirection chain starting at `key`.
    async fn get_mapped_value(&self, key: &str) -> Result<Option<String>, MappingError>;

    async fn get_mapped_values(&self) -> Result<Vec<Mapping>, MappingError>;

    async fn get_mapped_values_like(&self, prefix: &str) -> Result<Vec<Mapping>, MappingError>;

    async fn is_mapping_present(&self, key: &str) -> Result<bool, MappingError>;

    /// Upsert by key; existing mappings not named in `entries` are left alone.
    async fn import_mappings(
        &self,
        initiator: &Initiator,
        entries: &[MappingEntry],
    ) -> Result<ImportReport, MappingError>;

    async fn get_audit_events(
        &self,
        filter: &AuditJournalFilter,
    ) -> Result<Vec<AuditEventRecord>, AuditStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum MappingStoreError {
    #[error("mapping for key already exists: {0}")]
    Conflict(String),
    #[error("mapping not found: {0}")]
    NotFound(MappingId),
    #[error("mapping store error: {0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AuditStoreError {
    #[error("audit store error: {0}")]
    Other(String),
}

/// Indirection chain that revisits a key. `chain` lists the keys in traversal order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("closed mapping chain: {}", chain.join(" -> "))]
pub struct CycleError {
    pub chain: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("mapping for key already exists: {0}")]
    Conflict(String),
    #[error("mapping not found: id={0}")]
    NotFoundById(MappingId),
    #[error("mapping not found: key={0}")]
    NotFoundByKey(String),
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error("store: {0}")]
    Store(String),
}

impl From<MappingStoreError> for MappingError {
    fn from(e: MappingStoreError) -> Self {
        match e {
            MappingStoreError::Conflict(key) => MappingError::Conflict(key),
            MappingStoreError::NotFound(id) => MappingError::NotFoundById(id),
            MappingStoreError::Other(msg) => MappingError::Store(msg),
        }
    }
}
