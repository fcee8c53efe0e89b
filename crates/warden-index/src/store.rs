//! Storage contract for the file index

use warden_fs::NormalizedPath;

use crate::{FileRecord, Result, SyncStats};

/// Persistence for [`FileRecord`]s keyed by `(scope_id, relative_path)`.
///
/// Every call is independently atomic; a bulk caller that is interrupted
/// leaves each record either fully updated or untouched.
pub trait FileIndex: Send + Sync {
    /// Point lookup by scope and relative path.
    fn find(&self, scope_id: &str, relative_path: &NormalizedPath) -> Result<Option<FileRecord>>;

    /// Insert a record, or replace the one with the same scope and path.
    ///
    /// Returns the stored record with its `id` assigned.
    fn upsert(&self, record: &FileRecord) -> Result<FileRecord>;

    /// Store the verification flags of `record`, but only while the stored
    /// row still carries the same content hash and size.
    ///
    /// Returns `false` when the row is gone or was re-synced since `record`
    /// was read; the flags then describe stale content and are dropped.
    fn update_integrity(&self, record: &FileRecord) -> Result<bool>;

    /// All records of a scope ordered by relative path.
    fn list_by_scope(&self, scope_id: &str) -> Result<Vec<FileRecord>>;

    /// Delete one record. Returns whether it existed.
    fn delete(&self, id: i64) -> Result<bool>;

    /// Delete every record of a scope. Returns how many were removed.
    fn delete_all_by_scope(&self, scope_id: &str) -> Result<usize>;

    /// Aggregate counts for a scope.
    fn stats(&self, scope_id: &str) -> Result<SyncStats> {
        Ok(SyncStats::from_records(&self.list_by_scope(scope_id)?))
    }
}
