//! Atomic file writes guarded by advisory locks

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::{Error, Result};

/// Who may read a file written by [`write_atomic_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Default permissions from the process umask
    #[default]
    Shared,
    /// Owner read/write only (Unix `0600`); used for secret keys
    OwnerOnly,
}

/// Write content atomically to a file.
///
/// The content goes to a sibling temporary file which is locked, flushed and
/// then renamed over the target, so readers observe either the old or the new
/// content and never a partial write.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    write_atomic_with(path, content, Visibility::Shared)
}

/// [`write_atomic`] with explicit file visibility.
pub fn write_atomic_with(path: &Path, content: &[u8], visibility: Visibility) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let temp_path = temp_sibling(path);
    let mut temp_file = open_temp(&temp_path, visibility)?;

    temp_file
        .lock_exclusive()
        .map_err(|_| Error::LockFailed {
            path: path.to_path_buf(),
        })?;

    let written = temp_file
        .write_all(content)
        .and_then(|_| temp_file.sync_all());
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::io(&temp_path, e));
    }

    // Released on drop as well; unlocking first keeps Windows rename happy.
    let _ = FileExt::unlock(&temp_file);
    drop(temp_file);

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        Error::io(path, e)
    })
}

/// Read a file to a string.
pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::io(path, e))
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
}

fn open_temp(temp_path: &Path, visibility: Visibility) -> Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    if visibility == Visibility::OwnerOnly {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = visibility;

    options.open(temp_path).map_err(|e| Error::io(temp_path, e))
}
