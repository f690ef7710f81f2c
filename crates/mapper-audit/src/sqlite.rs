//! SQLite-backed audit storage.

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use mapper_types::{
    AuditEventKind, AuditEventRecord, AuditJournalFilter, AuditRecordId, AuditRecordStorage,
    AuditStoreError, Initiator, MappingId,
};
use std::collections::BTreeMap;
use std::path::Path;

/// Events live in `audit_events`; their additional info in `audit_event_info`.
/// `mapping_id` is deliberately not a foreign key: records outlive their mappings.
pub struct SqliteAuditRecordStorage {
    conn: std::sync::Mutex<rusqlite::Connection>,
}

impl SqliteAuditRecordStorage {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, AuditStoreError> {
        let conn =
            rusqlite::Connection::open(path).map_err(|e| AuditStoreError::Other(e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS audit_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                initiator TEXT NOT NULL,
                timestamp_us INTEGER NOT NULL,
                event_kind TEXT NOT NULL,
                mapping_id INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS audit_event_info (
                event_id INTEGER NOT NULL REFERENCES audit_events(id),
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (event_id, key)
            );

            CREATE INDEX IF NOT EXISTS idx_audit_events_ts ON audit_events(timestamp_us);
            CREATE INDEX IF NOT EXISTS idx_audit_events_mapping ON audit_events(mapping_id);
            "#,
        )
        .map_err(|e| AuditStoreError::Other(e.to_string()))?;

        Ok(Self {
            conn: std::sync::Mutex::new(conn),
        })
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T, AuditStoreError>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| AuditStoreError::Other(format!("failed to acquire lock: {}", e)))?;
        f(&conn).map_err(|e| AuditStoreError::Other(e.to_string()))
    }
}

fn to_micros(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

fn from_micros(us: i64) -> Option<DateTime<Utc>> {
    let secs = us.div_euclid(1_000_000);
    let nanos = (us.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos)
}

fn conversion_error(msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, msg)),
    )
}

#[async_trait]
impl AuditRecordStorage for SqliteAuditRecordStorage {
    async fn add_audit_event(
        &self,
        mut record: AuditEventRecord,
    ) -> Result<AuditEventRecord, AuditStoreError> {
        // Stored at microsecond precision; return what a later read will see.
        record.timestamp = record.timestamp.trunc_subsecs(6);
        let id = self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO audit_events (initiator, timestamp_us, event_kind, mapping_id) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    record.initiator.as_str(),
                    to_micros(&record.timestamp),
                    record.event.as_str(),
                    record.mapping_id.get(),
                ],
            )?;
            let id = tx.last_insert_rowid();
            for (key, value) in &record.additional_info {
                tx.execute(
                    "INSERT INTO audit_event_info (event_id, key, value) VALUES (?1, ?2, ?3)",
                    rusqlite::params![id, key, value],
                )?;
            }
            tx.commit()?;
            Ok(id)
        })?;
        record.id = Some(AuditRecordId(id));
        Ok(record)
    }

    async fn get_records(
        &self,
        filter: &AuditJournalFilter,
    ) -> Result<Vec<AuditEventRecord>, AuditStoreError> {
        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if !filter.mapping_ids().is_empty() {
            let marks = vec!["?"; filter.mapping_ids().len()].join(", ");
            clauses.push(format!("mapping_id IN ({})", marks));
            params.extend(
                filter
                    .mapping_ids()
                    .iter()
                    .map(|id| Box::new(id.get()) as Box<dyn rusqlite::ToSql>),
            );
        }
        if !filter.initiators().is_empty() {
            let marks = vec!["?"; filter.initiators().len()].join(", ");
            clauses.push(format!("initiator IN ({})", marks));
            params.extend(
                filter
                    .initiators()
                    .iter()
                    .map(|i| Box::new(i.as_str().to_string()) as Box<dyn rusqlite::ToSql>),
            );
        }
        if let Some(kind) = filter.event_kind() {
            clauses.push("event_kind = ?".to_string());
            params.push(Box::new(kind.as_str()));
        }
        let range = filter.date_range();
        clauses.push("timestamp_us >= ? AND timestamp_us < ?".to_string());
        params.push(Box::new(to_micros(&range.start)));
        params.push(Box::new(to_micros(&range.end)));

        let sql = format!(
            "SELECT id, initiator, timestamp_us, event_kind, mapping_id FROM audit_events WHERE {} ORDER BY timestamp_us DESC, id DESC LIMIT {}",
            clauses.join(" AND "),
            filter.max_results()
        );

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let rows = stmt.query_map(param_refs.as_slice(), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?;
            let rows = rows.collect::<Result<Vec<_>, _>>()?;

            let mut info_stmt =
                conn.prepare("SELECT key, value FROM audit_event_info WHERE event_id = ?1")?;
            let mut records = Vec::with_capacity(rows.len());
            for (id, initiator, ts, kind, mapping_id) in rows {
                let timestamp = from_micros(ts)
                    .ok_or_else(|| conversion_error(format!("bad timestamp: {}", ts)))?;
                let event: AuditEventKind =
                    kind.parse().map_err(|e| conversion_error(format!("{}", e)))?;
                let info = info_stmt
                    .query_map([id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
                    .collect::<Result<BTreeMap<_, _>, _>>()?;
                records.push(AuditEventRecord {
                    id: Some(AuditRecordId(id)),
                    initiator: Initiator::new(initiator),
                    timestamp,
                    event,
                    mapping_id: MappingId(mapping_id),
                    additional_info: info,
                });
            }
            Ok(records)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuditRecordBuilder;
    use mapper_types::Mapping;

    #[tokio::test]
    async fn persists_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteAuditRecordStorage::new(dir.path().join("audit.db")).unwrap();
        let b = AuditRecordBuilder::new();
        let alice = Initiator::new("alice");
        let bob = Initiator::new("bob");
        let m1 = Mapping::new(MappingId(1), "k1", "v1");
        let m2 = Mapping::new(MappingId(2), "k2", "v2");

        storage.add_audit_event(b.create_event(&alice, &m1)).await.unwrap();
        storage.add_audit_event(b.create_event(&bob, &m2)).await.unwrap();
        let upd = storage
            .add_audit_event(b.update_event(&alice, &m1, &Mapping::new(MappingId(1), "k1", "v9")))
            .await
            .unwrap();

        let all = storage.get_records(&AuditJournalFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, upd.id);
        assert_eq!(all[0].additional_info["newMapping.value"], "v9");

        let f = AuditJournalFilter::builder()
            .by_initiator("alice")
            .by_event(AuditEventKind::Create)
            .build()
            .unwrap();
        let only = storage.get_records(&f).await.unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].mapping_id, MappingId(1));

        let f = AuditJournalFilter::builder()
            .for_ids([MappingId(2)])
            .with_events_limit(10)
            .build()
            .unwrap();
        let only = storage.get_records(&f).await.unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].initiator, bob);
    }

    #[tokio::test]
    async fn returned_record_equals_stored_record() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteAuditRecordStorage::new(dir.path().join("audit.db")).unwrap();
        let mut record = AuditRecordBuilder::new()
            .create_event(&Initiator::new("admin"), &Mapping::new(MappingId(1), "k", "v"));
        record.timestamp = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();

        let saved = storage.add_audit_event(record).await.unwrap();
        assert_eq!(
            saved.timestamp,
            DateTime::from_timestamp(1_700_000_000, 123_456_000).unwrap()
        );
        let read = storage.get_records(&AuditJournalFilter::default()).await.unwrap();
        assert_eq!(read, vec![saved]);
    }

    #[test]
    fn micros_round_trip_before_epoch() {
        let ts = DateTime::from_timestamp(-5, 250_000_000).unwrap();
        assert_eq!(from_micros(to_micros(&ts)), Some(ts));
    }
}
