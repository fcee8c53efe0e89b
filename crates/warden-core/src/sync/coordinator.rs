//! Reconciles a scope's directory with the file index

use std::ops::AddAssign;
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use warden_fs::digest::DEFAULT_CHUNK_SIZE;
use warden_fs::filter::CompiledFilter;
use warden_fs::{FileDigest, NormalizedPath, WalkedFile, hash_file_with, walk_files};
use warden_index::{FileIndex, FileRecord};

use super::lock::{Acquire, ScopeLocks};
use crate::{Error, Result};

/// Counts from one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub added: usize,
    pub updated: usize,
    pub errors: usize,
}

impl AddAssign for SyncOutcome {
    fn add_assign(&mut self, other: Self) {
        self.added += other.added;
        self.updated += other.updated;
        self.errors += other.errors;
    }
}

/// Result of asking for a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRun {
    /// The sync ran, including any re-run queued while it was in flight
    Completed(SyncOutcome),
    /// The scope was already syncing; a re-run was queued on that sync
    Coalesced,
}

impl SyncRun {
    pub fn outcome(&self) -> Option<SyncOutcome> {
        match self {
            Self::Completed(outcome) => Some(*outcome),
            Self::Coalesced => None,
        }
    }
}

/// Tuning for [`SyncCoordinator`].
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub chunk_size: usize,
    pub parallel: bool,
    pub filter: CompiledFilter,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            parallel: true,
            filter: CompiledFilter::allow_all(),
        }
    }
}

/// Walks scope directories and applies additions and updates to the index.
///
/// Records are never removed by a sync. [`SyncCoordinator::prune_missing`]
/// is the explicit way to drop records whose files are gone.
pub struct SyncCoordinator {
    index: Arc<dyn FileIndex>,
    locks: ScopeLocks,
    options: SyncOptions,
}

impl SyncCoordinator {
    pub fn new(index: Arc<dyn FileIndex>, options: SyncOptions) -> Self {
        Self {
            index,
            locks: ScopeLocks::new(),
            options,
        }
    }

    /// Locks shared with anything else that mutates a scope's records.
    pub fn locks(&self) -> &ScopeLocks {
        &self.locks
    }

    /// Sync one scope.
    ///
    /// Unreadable files are counted in `errors` and skipped. If the scope is
    /// already syncing, the call returns [`SyncRun::Coalesced`] at once and
    /// the running sync makes one more pass before it finishes.
    ///
    /// # Errors
    ///
    /// `ScopeRootMissing` when `root` is not a directory. A queued re-run
    /// that fails is logged and the counts of the passes that finished are
    /// returned.
    pub fn sync_scope(&self, scope: &str, root: &Path) -> Result<SyncRun> {
        let mut guard = match self.locks.try_acquire(scope, true) {
            Acquire::Acquired(guard) => guard,
            Acquire::Busy => {
                info!(scope = %scope, "Sync already running, queued one re-run");
                return Ok(SyncRun::Coalesced);
            }
        };

        let mut total = self.run_once(scope, root)?;
        while guard.release_or_rerun() {
            debug!(scope = %scope, "running queued sync");
            match self.run_once(scope, root) {
                Ok(outcome) => total += outcome,
                Err(e) => {
                    // Records from the finished pass are already written
                    warn!(scope = %scope, error = %e, "Queued sync failed, reporting completed passes");
                    break;
                }
            }
        }

        info!(
            scope = %scope,
            added = total.added,
            updated = total.updated,
            errors = total.errors,
            "Sync complete"
        );
        Ok(SyncRun::Completed(total))
    }

    fn run_once(&self, scope: &str, root: &Path) -> Result<SyncOutcome> {
        if !root.is_dir() {
            return Err(Error::ScopeRootMissing {
                scope: scope.to_string(),
                path: root.to_path_buf(),
            });
        }

        let report = walk_files(root, &self.options.filter)?;
        let mut outcome = SyncOutcome {
            errors: report.failures.len(),
            ..SyncOutcome::default()
        };
        for failure in &report.failures {
            warn!(scope = %scope, path = %failure.path.display(), error = %failure.message, "skipping unreadable entry");
        }

        let chunk_size = self.options.chunk_size;
        let hash = |file: &WalkedFile| (file.rel.clone(), hash_file_with(&file.abs, chunk_size));
        let digests: Vec<_> = if self.options.parallel {
            report.files.par_iter().map(hash).collect()
        } else {
            report.files.iter().map(hash).collect()
        };

        for (rel, digest) in digests {
            let digest = match digest {
                Ok(digest) => digest,
                Err(e) => {
                    warn!(scope = %scope, path = %rel, error = %e, "failed to hash file");
                    outcome.errors += 1;
                    continue;
                }
            };
            match self.apply(scope, rel.clone(), digest) {
                Ok(Change::Added) => outcome.added += 1,
                Ok(Change::Updated) => outcome.updated += 1,
                Ok(Change::Unchanged) => {}
                Err(e) => {
                    warn!(scope = %scope, path = %rel, error = %e, "failed to record file");
                    outcome.errors += 1;
                }
            }
        }

        Ok(outcome)
    }

    fn apply(&self, scope: &str, rel: NormalizedPath, digest: FileDigest) -> Result<Change> {
        match self.index.find(scope, &rel)? {
            None => {
                debug!(scope = %scope, path = %rel, "new file");
                self.index.upsert(&FileRecord::new(scope, rel, digest))?;
                Ok(Change::Added)
            }
            Some(mut record) => {
                if !record.observe(digest) {
                    return Ok(Change::Unchanged);
                }
                debug!(scope = %scope, path = %rel, "file changed");
                self.index.upsert(&record)?;
                Ok(Change::Updated)
            }
        }
    }

    /// Delete records whose file no longer exists under `root`.
    ///
    /// Never called by [`SyncCoordinator::sync_scope`]. Returns how many
    /// records were removed.
    ///
    /// # Errors
    ///
    /// `ScopeBusy` if the scope is syncing, `ScopeRootMissing` if `root` is
    /// gone. A missing root would otherwise look like every file was deleted.
    pub fn prune_missing(&self, scope: &str, root: &Path) -> Result<usize> {
        let _guard = match self.locks.try_acquire(scope, false) {
            Acquire::Acquired(guard) => guard,
            Acquire::Busy => {
                return Err(Error::ScopeBusy {
                    scope: scope.to_string(),
                });
            }
        };
        if !root.is_dir() {
            return Err(Error::ScopeRootMissing {
                scope: scope.to_string(),
                path: root.to_path_buf(),
            });
        }

        let mut removed = 0;
        for record in self.index.list_by_scope(scope)? {
            if record.relative_path.under(root).is_file() {
                continue;
            }
            if let Some(id) = record.id
                && self.index.delete(id)?
            {
                info!(scope = %scope, path = %record.relative_path, "pruned record of missing file");
                removed += 1;
            }
        }
        Ok(removed)
    }
}

enum Change {
    Added,
    Updated,
    Unchanged,
}
