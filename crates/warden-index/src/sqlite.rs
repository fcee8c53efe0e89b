//! SQLite-backed file index

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};
use warden_fs::{FileDigest, NormalizedPath};

use crate::schema::{SCHEMA, SCHEMA_VERSION};
use crate::{Error, FileIndex, FileRecord, FileType, Result, SyncStats};

const COLUMNS: &str = "id, scope_id, relative_path, content_hash, size_bytes, file_type, \
                       verified, integrity_check_failed, download_url, last_synced_at";

/// A [`FileIndex`] stored in a SQLite database.
///
/// The connection is shared behind a mutex, so each call runs to completion
/// before the next one starts.
pub struct SqliteFileIndex {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteFileIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteFileIndex").finish_non_exhaustive()
    }
}

impl SqliteFileIndex {
    /// Open or create a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Self::initialize(conn)
    }

    /// Create an in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;

        let version: Option<u32> = conn
            .query_row(
                "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match version {
            None => {
                info!("Initializing file index schema");
                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    params![SCHEMA_VERSION],
                )?;
            }
            Some(v) if v != SCHEMA_VERSION => {
                return Err(Error::SchemaVersionMismatch {
                    expected: SCHEMA_VERSION,
                    actual: v,
                });
            }
            Some(_) => debug!("File index schema up to date (version {})", SCHEMA_VERSION),
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::Poisoned)
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let file_type: String = row.get(5)?;
    let file_type = file_type
        .parse::<FileType>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, e.into()))?;

    let synced: String = row.get(9)?;
    let last_synced_at = DateTime::parse_from_rfc3339(&synced)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    let size: i64 = row.get(4)?;
    Ok(FileRecord::from_parts(
        row.get(0)?,
        row.get(1)?,
        NormalizedPath::new(row.get::<_, String>(2)?),
        FileDigest {
            hash: row.get(3)?,
            size: size as u64,
        },
        file_type,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        last_synced_at,
    ))
}

impl FileIndex for SqliteFileIndex {
    fn find(&self, scope_id: &str, relative_path: &NormalizedPath) -> Result<Option<FileRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM file_records WHERE scope_id = ?1 AND relative_path = ?2",
                    COLUMNS
                ),
                params![scope_id, relative_path.as_str()],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn upsert(&self, record: &FileRecord) -> Result<FileRecord> {
        let conn = self.conn()?;
        let id: i64 = conn.query_row(
            r#"
            INSERT INTO file_records (
                scope_id, relative_path, content_hash, size_bytes, file_type,
                verified, integrity_check_failed, download_url, last_synced_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT (scope_id, relative_path) DO UPDATE SET
                content_hash = excluded.content_hash,
                size_bytes = excluded.size_bytes,
                file_type = excluded.file_type,
                verified = excluded.verified,
                integrity_check_failed = excluded.integrity_check_failed,
                download_url = excluded.download_url,
                last_synced_at = excluded.last_synced_at
            RETURNING id
            "#,
            params![
                record.scope_id,
                record.relative_path.as_str(),
                record.content_hash(),
                record.size_bytes() as i64,
                record.file_type.as_str(),
                record.verified,
                record.integrity_check_failed,
                record.download_url,
                record.last_synced_at().to_rfc3339(),
            ],
            |row| row.get(0),
        )?;

        let mut stored = record.clone();
        stored.id = Some(id);
        Ok(stored)
    }

    fn update_integrity(&self, record: &FileRecord) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE file_records
            SET verified = ?1, integrity_check_failed = ?2
            WHERE scope_id = ?3 AND relative_path = ?4
              AND content_hash = ?5 AND size_bytes = ?6
            "#,
            params![
                record.verified,
                record.integrity_check_failed,
                record.scope_id,
                record.relative_path.as_str(),
                record.content_hash(),
                record.size_bytes() as i64,
            ],
        )?;
        Ok(updated > 0)
    }

    fn list_by_scope(&self, scope_id: &str) -> Result<Vec<FileRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM file_records WHERE scope_id = ?1 ORDER BY relative_path",
            COLUMNS
        ))?;
        let records = stmt
            .query_map(params![scope_id], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM file_records WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    fn delete_all_by_scope(&self, scope_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM file_records WHERE scope_id = ?1",
            params![scope_id],
        )?;
        debug!(scope = %scope_id, removed, "deleted scope records");
        Ok(removed)
    }

    fn stats(&self, scope_id: &str) -> Result<SyncStats> {
        let conn = self.conn()?;
        let (total, verified, failed, last): (i64, i64, i64, Option<String>) = conn.query_row(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(verified), 0),
                   COALESCE(SUM(integrity_check_failed), 0),
                   MAX(last_synced_at)
            FROM file_records WHERE scope_id = ?1
            "#,
            params![scope_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

        let last_sync = last
            .map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| Error::InvalidRecord {
                        scope: scope_id.to_string(),
                        path: String::new(),
                        message: e.to_string(),
                    })
            })
            .transpose()?;

        Ok(SyncStats {
            total_files: total as u64,
            verified_files: verified as u64,
            failed_files: failed as u64,
            last_sync,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reopening_keeps_schema_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");

        {
            let index = SqliteFileIndex::open(&path).unwrap();
            let record = FileRecord::new(
                "1.20",
                NormalizedPath::new("client.jar"),
                FileDigest {
                    hash: "ab".into(),
                    size: 2,
                },
            );
            index.upsert(&record).unwrap();
        }

        let index = SqliteFileIndex::open(&path).unwrap();
        let found = index
            .find("1.20", &NormalizedPath::new("client.jar"))
            .unwrap()
            .unwrap();
        assert_eq!(found.content_hash(), "ab");
        assert_eq!(found.file_type, FileType::Executable);
    }

    #[test]
    fn newer_schema_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        drop(SqliteFileIndex::open(&path).unwrap());

        let conn = Connection::open(&path).unwrap();
        conn.execute("INSERT INTO schema_version (version) VALUES (99)", [])
            .unwrap();
        drop(conn);

        let err = SqliteFileIndex::open(&path).unwrap_err();
        assert!(matches!(
            err,
            Error::SchemaVersionMismatch { actual: 99, .. }
        ));
    }
}
