//! Symlink-safe recursive file enumeration

use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::filter::CompiledFilter;
use crate::{Error, NormalizedPath, Result};

/// A regular file found under a walk root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    pub abs: PathBuf,
    pub rel: NormalizedPath,
}

/// An entry the walk could not visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Everything a walk observed.
#[derive(Debug, Clone, Default)]
pub struct WalkReport {
    /// Files in file-name order
    pub files: Vec<WalkedFile>,
    pub failures: Vec<WalkFailure>,
    /// Symlinks skipped because they point back into an ancestor
    pub loops_skipped: usize,
}

/// Enumerate every file under `root` that passes `filter`.
///
/// Symbolic links are followed, except links whose target is an ancestor of
/// the link itself. Unreadable entries are collected as failures.
///
/// # Errors
///
/// Returns an error if `root` is not a directory.
pub fn walk_files(root: &Path, filter: &CompiledFilter) -> Result<WalkReport> {
    if !root.is_dir() {
        return Err(Error::NotADirectory {
            path: root.to_path_buf(),
        });
    }

    let mut report = WalkReport::default();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let Some(rel) = NormalizedPath::relative(root, entry.path()) else {
                return false;
            };
            if entry.file_type().is_dir() {
                filter.descends_into(rel.as_str())
            } else {
                !filter.is_excluded(rel.as_str())
            }
        });

    for item in walker {
        let entry = match item {
            Ok(entry) => entry,
            Err(e) => {
                if e.loop_ancestor().is_some() {
                    warn!(path = ?e.path(), "skipping symlink loop");
                    report.loops_skipped += 1;
                } else {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                    warn!(path = %path.display(), error = %e, "walk failure");
                    report.failures.push(WalkFailure {
                        path,
                        message: e.to_string(),
                    });
                }
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        let Some(rel) = NormalizedPath::relative(root, entry.path()) else {
            continue;
        };
        if !filter.keeps_file(rel.as_str()) {
            continue;
        }
        report.files.push(WalkedFile {
            abs: entry.into_path(),
            rel,
        });
    }

    Ok(report)
}
