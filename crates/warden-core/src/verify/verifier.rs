//! Re-hashes indexed files and flags mismatches

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use warden_fs::digest::DEFAULT_CHUNK_SIZE;
use warden_fs::{FileDigest, NormalizedPath, hash_file_with};
use warden_index::{FileIndex, FileRecord};

use crate::Result;

/// Counts from a bulk verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityOutcome {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    /// Shutdown was requested before every record was checked
    pub interrupted: bool,
}

/// What a fresh read of a file showed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Match,
    Mismatch { actual: FileDigest },
    Unreadable { message: String },
}

impl Observation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Match)
    }

    /// Observed hash, or a placeholder when the file could not be read.
    pub fn actual_hash(&self, expected: &str) -> String {
        match self {
            Self::Match => expected.to_string(),
            Self::Mismatch { actual } => actual.hash.clone(),
            Self::Unreadable { .. } => "<unreadable>".to_string(),
        }
    }
}

/// A record together with what its file looks like right now.
#[derive(Debug, Clone)]
pub struct Checked {
    pub record: FileRecord,
    pub observation: Observation,
}

/// Compares indexed digests against the files on disk.
pub struct IntegrityVerifier {
    index: Arc<dyn FileIndex>,
    chunk_size: usize,
    parallel: bool,
    shutdown: Arc<AtomicBool>,
}

impl IntegrityVerifier {
    pub fn new(index: Arc<dyn FileIndex>) -> Self {
        Self {
            index,
            chunk_size: DEFAULT_CHUNK_SIZE,
            parallel: true,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Share a shutdown flag with the hosting process.
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Stop any running [`IntegrityVerifier::verify_scope`] after the
    /// records already in progress.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Re-hash one file and compare it with its record. Reads the whole
    /// file every time; the stored flags are never trusted.
    pub fn observe(&self, root: &Path, record: &FileRecord) -> Observation {
        let path = record.relative_path.under(root);
        match hash_file_with(&path, self.chunk_size) {
            Ok(digest) if record.matches(&digest) => Observation::Match,
            Ok(digest) => Observation::Mismatch { actual: digest },
            Err(e) => Observation::Unreadable {
                message: e.to_string(),
            },
        }
    }

    /// Check every record of a scope and update its flags.
    ///
    /// Mismatched and unreadable files are flagged, never deleted or
    /// repaired. Each flag change is written on its own, so an interrupted
    /// run leaves every record either updated or untouched.
    pub fn verify_scope(&self, scope: &str, root: &Path) -> Result<IntegrityOutcome> {
        let records = self.index.list_by_scope(scope)?;

        let check = |record: FileRecord| -> Option<bool> {
            if self.shutdown.load(Ordering::SeqCst) {
                return None;
            }
            let checked = self.check_record(scope, root, record);
            Some(checked.observation.is_valid())
        };
        let results: Vec<Option<bool>> = if self.parallel {
            records.into_par_iter().map(check).collect()
        } else {
            records.into_iter().map(check).collect()
        };

        let mut outcome = IntegrityOutcome::default();
        for result in results {
            match result {
                Some(true) => outcome.valid += 1,
                Some(false) => outcome.invalid += 1,
                None => outcome.interrupted = true,
            }
        }
        outcome.total = outcome.valid + outcome.invalid;

        if outcome.interrupted {
            info!(scope = %scope, checked = outcome.total, "Verification interrupted by shutdown");
        } else {
            info!(
                scope = %scope,
                total = outcome.total,
                valid = outcome.valid,
                invalid = outcome.invalid,
                "Verification complete"
            );
        }
        Ok(outcome)
    }

    /// Check a single file. Unknown or out-of-scope paths are never valid.
    pub fn verify_one(&self, scope: &str, root: &Path, path: &NormalizedPath) -> Result<bool> {
        Ok(self
            .check_one(scope, root, path)?
            .is_some_and(|checked| checked.observation.is_valid()))
    }

    /// [`IntegrityVerifier::verify_one`] returning the record and what was
    /// observed, or `None` when there is nothing to check.
    pub fn check_one(
        &self,
        scope: &str,
        root: &Path,
        path: &NormalizedPath,
    ) -> Result<Option<Checked>> {
        Ok(self
            .find(scope, path)?
            .map(|record| self.check_record(scope, root, record)))
    }

    /// Look up the record for a path, refusing paths that leave the scope.
    pub fn find(&self, scope: &str, path: &NormalizedPath) -> Result<Option<FileRecord>> {
        if !path.is_contained() {
            warn!(scope = %scope, path = %path, "rejecting path outside the scope");
            return Ok(None);
        }
        let record = self.index.find(scope, path)?;
        if record.is_none() {
            debug!(scope = %scope, path = %path, "no record for path");
        }
        Ok(record)
    }

    /// Re-hash a record's file and store the resulting flags.
    ///
    /// Flags are written only if the indexed content is still the content
    /// that was checked, so a sync that lands mid-check is never undone.
    pub fn check_record(&self, scope: &str, root: &Path, mut record: FileRecord) -> Checked {
        let observation = self.observe(root, &record);
        match &observation {
            Observation::Match => {}
            Observation::Mismatch { actual } => warn!(
                scope = %scope,
                path = %record.relative_path,
                expected = %record.content_hash(),
                actual = %actual.hash,
                "Integrity mismatch"
            ),
            Observation::Unreadable { message } => warn!(
                scope = %scope,
                path = %record.relative_path,
                error = %message,
                "Indexed file unreadable"
            ),
        }

        if record.set_integrity(observation.is_valid()) {
            match self.index.update_integrity(&record) {
                Ok(true) => {}
                Ok(false) => debug!(
                    scope = %scope,
                    path = %record.relative_path,
                    "record re-synced during check, flags not stored"
                ),
                Err(e) => warn!(
                    scope = %scope,
                    path = %record.relative_path,
                    error = %e,
                    "failed to store integrity flags"
                ),
            }
        }

        Checked {
            record,
            observation,
        }
    }
}
