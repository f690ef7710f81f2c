//! Audit trail for mapping mutations: record construction, the journal, and storage backends.

mod builder;
mod journal;
mod jsonl;
mod memory;

#[cfg(feature = "sqlite")]
mod sqlite;

pub use builder::AuditRecordBuilder;
pub use journal::DefaultAuditJournal;
pub use jsonl::JsonlAuditRecordStorage;
pub use mapper_types::{
    AuditEventKind, AuditEventRecord, AuditJournal, AuditJournalFilter, AuditRecordStorage,
    AuditStoreError,
};
pub use memory::InMemoryAuditRecordStorage;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteAuditRecordStorage;
