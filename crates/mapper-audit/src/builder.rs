//! Construction of unpersisted audit records. No I/O happens here.

use chrono::Utc;
use mapper_types::{AuditEventKind, AuditEventRecord, Initiator, Mapping};
use std::collections::BTreeMap;

const OLD_MAPPING_PREFIX: &str = "oldMapping.";
const NEW_MAPPING_PREFIX: &str = "newMapping.";

/// Builds audit records for create/update/delete outcomes.
/// The timestamp is taken when the record is built, not when it is persisted.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditRecordBuilder;

impl AuditRecordBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn create_event(&self, initiator: &Initiator, created: &Mapping) -> AuditEventRecord {
        Self::basic_record(initiator, AuditEventKind::Create, created, mapping_info(created, ""))
    }

    pub fn delete_event(&self, initiator: &Initiator, removed: &Mapping) -> AuditEventRecord {
        Self::basic_record(initiator, AuditEventKind::Delete, removed, mapping_info(removed, ""))
    }

    /// Both states are kept under `oldMapping.*` and `newMapping.*`.
    pub fn update_event(
        &self,
        initiator: &Initiator,
        current: &Mapping,
        updated: &Mapping,
    ) -> AuditEventRecord {
        let mut info = mapping_info(current, OLD_MAPPING_PREFIX);
        info.extend(mapping_info(updated, NEW_MAPPING_PREFIX));
        Self::basic_record(initiator, AuditEventKind::Update, current, info)
    }

    fn basic_record(
        initiator: &Initiator,
        event: AuditEventKind,
        related: &Mapping,
        additional_info: BTreeMap<String, String>,
    ) -> AuditEventRecord {
        AuditEventRecord {
            id: None,
            initiator: initiator.clone(),
            timestamp: Utc::now(),
            event,
            mapping_id: related.id,
            additional_info,
        }
    }
}

fn mapping_info(mapping: &Mapping, prefix: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (format!("{}key", prefix), mapping.key.clone()),
        (format!("{}value", prefix), mapping.value.clone()),
    ])
}
