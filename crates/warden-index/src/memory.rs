//! In-memory file index

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use warden_fs::NormalizedPath;

use crate::{Error, FileIndex, FileRecord, Result};

type Key = (String, NormalizedPath);

/// A [`FileIndex`] held in process memory.
#[derive(Debug, Default)]
pub struct MemoryFileIndex {
    records: RwLock<BTreeMap<Key, FileRecord>>,
    next_id: AtomicI64,
}

impl MemoryFileIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileIndex for MemoryFileIndex {
    fn find(&self, scope_id: &str, relative_path: &NormalizedPath) -> Result<Option<FileRecord>> {
        let records = self.records.read().map_err(|_| Error::Poisoned)?;
        Ok(records
            .get(&(scope_id.to_string(), relative_path.clone()))
            .cloned())
    }

    fn upsert(&self, record: &FileRecord) -> Result<FileRecord> {
        let mut records = self.records.write().map_err(|_| Error::Poisoned)?;
        let key = (record.scope_id.clone(), record.relative_path.clone());

        let id = match records.get(&key).and_then(|existing| existing.id) {
            Some(id) => id,
            None => self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
        };
        let mut stored = record.clone();
        stored.id = Some(id);
        records.insert(key, stored.clone());
        Ok(stored)
    }

    fn update_integrity(&self, record: &FileRecord) -> Result<bool> {
        let mut records = self.records.write().map_err(|_| Error::Poisoned)?;
        let key = (record.scope_id.clone(), record.relative_path.clone());
        match records.get_mut(&key) {
            Some(stored)
                if stored.content_hash() == record.content_hash()
                    && stored.size_bytes() == record.size_bytes() =>
            {
                stored.verified = record.verified;
                stored.integrity_check_failed = record.integrity_check_failed;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn list_by_scope(&self, scope_id: &str) -> Result<Vec<FileRecord>> {
        let records = self.records.read().map_err(|_| Error::Poisoned)?;
        Ok(records
            .iter()
            .filter(|((scope, _), _)| scope == scope_id)
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn delete(&self, id: i64) -> Result<bool> {
        let mut records = self.records.write().map_err(|_| Error::Poisoned)?;
        let before = records.len();
        records.retain(|_, record| record.id != Some(id));
        Ok(records.len() != before)
    }

    fn delete_all_by_scope(&self, scope_id: &str) -> Result<usize> {
        let mut records = self.records.write().map_err(|_| Error::Poisoned)?;
        let before = records.len();
        records.retain(|(scope, _), _| scope != scope_id);
        Ok(before - records.len())
    }
}
