//! SQLite-backed mapping store.

use async_trait::async_trait;
use mapper_types::{Mapping, MappingId, MappingStore, MappingStoreError};
use rusqlite::{ErrorCode, OptionalExtension};
use std::path::Path;

/// SQLite-backed mapping store. The `UNIQUE` constraint on `key` is the final authority on
/// key uniqueness; a violation comes back as [`MappingStoreError::Conflict`].
pub struct SqliteMappingStore {
    conn: std::sync::Mutex<rusqlite::Connection>,
}

impl SqliteMappingStore {
    /// Open (or create) the store at the given path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, MappingStoreError> {
        let path = path.as_ref();
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| MappingStoreError::Other(e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS mappings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL UNIQUE,
                value TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| MappingStoreError::Other(e.to_string()))?;

        tracing::debug!(path = %path.display(), "opened sqlite mapping store");
        Ok(Self {
            conn: std::sync::Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>, MappingStoreError> {
        self.conn
            .lock()
            .map_err(|e| MappingStoreError::Other(format!("failed to acquire lock: {}", e)))
    }

    fn query_many(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Mapping>, MappingStoreError> {
        let conn = self.conn()?;
        let query = || -> Result<Vec<Mapping>, rusqlite::Error> {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params, parse_mapping_row)?;
            let mappings = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(mappings)
        };
        query().map_err(|e| MappingStoreError::Other(e.to_string()))
    }
}

fn parse_mapping_row(row: &rusqlite::Row) -> Result<Mapping, rusqlite::Error> {
    Ok(Mapping {
        id: MappingId(row.get(0)?),
        key: row.get(1)?,
        value: row.get(2)?,
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation)
}

#[async_trait]
impl MappingStore for SqliteMappingStore {
    async fn create(&self, key: &str, value: &str) -> Result<Mapping, MappingStoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO mappings (key, value) VALUES (?1, ?2)",
            rusqlite::params![key, value],
        )
        .map(|_| Mapping::new(MappingId(conn.last_insert_rowid()), key, value))
        .map_err(|e| {
            if is_unique_violation(&e) {
                MappingStoreError::Conflict(key.to_string())
            } else {
                MappingStoreError::Other(e.to_string())
            }
        })
    }

    async fn delete(&self, key: &str) -> Result<(), MappingStoreError> {
        self.conn()?
            .execute("DELETE FROM mappings WHERE key = ?1", [key])
            .map_err(|e| MappingStoreError::Other(e.to_string()))?;
        Ok(())
    }

    async fn update_by_id(
        &self,
        id: MappingId,
        new_key: &str,
        new_value: &str,
    ) -> Result<Mapping, MappingStoreError> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE mappings SET key = ?1, value = ?2 WHERE id = ?3",
                rusqlite::params![new_key, new_value, id.get()],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    MappingStoreError::Conflict(new_key.to_string())
                } else {
                    MappingStoreError::Other(e.to_string())
                }
            })?;
        if changed == 0 {
            return Err(MappingStoreError::NotFound(id));
        }
        Ok(Mapping::new(id, new_key, new_value))
    }

    async fn get_all(&self) -> Result<Vec<Mapping>, MappingStoreError> {
        self.query_many("SELECT id, key, value FROM mappings ORDER BY id", rusqlite::params![])
    }

    async fn get_by_key_prefix(&self, prefix: &str) -> Result<Vec<Mapping>, MappingStoreError> {
        // substr comparison instead of LIKE: keys may contain '%' and '_'.
        self.query_many(
            "SELECT id, key, value FROM mappings WHERE substr(key, 1, length(?1)) = ?1 ORDER BY id",
            rusqlite::params![prefix],
        )
    }

    async fn get_by_key(&self, key: &str) -> Result<Option<Mapping>, MappingStoreError> {
        self.conn()?
            .query_row(
                "SELECT id, key, value FROM mappings WHERE key = ?1",
                [key],
                parse_mapping_row,
            )
            .optional()
            .map_err(|e| MappingStoreError::Other(e.to_string()))
    }

    async fn get_by_id(&self, id: MappingId) -> Result<Option<Mapping>, MappingStoreError> {
        self.conn()?
            .query_row(
                "SELECT id, key, value FROM mappings WHERE id = ?1",
                [id.get()],
                parse_mapping_row,
            )
            .optional()
            .map_err(|e| MappingStoreError::Other(e.to_string()))
    }
}
