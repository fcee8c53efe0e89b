//! [`ScopeFixture`] builder for scope directory scenarios.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary staging directory holding one or more scope trees.
///
/// # Example
///
/// ```rust,no_run
/// use warden_test_utils::ScopeFixture;
///
/// let fixture = ScopeFixture::new()
///     .with_file("a.txt", "A")
///     .with_file("b/b.txt", "B");
/// fixture.assert_file_contains("b/b.txt", "B");
/// ```
pub struct ScopeFixture {
    temp_dir: TempDir,
}

impl Default for ScopeFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeFixture {
    /// Create an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("ScopeFixture::new: failed to create temp dir"),
        }
    }

    /// The three-file tree used throughout the engine tests:
    /// `a.txt` = "A", `b/b.txt` = "B", `c.txt` = "C".
    pub fn abc() -> Self {
        Self::new()
            .with_file("a.txt", "A")
            .with_file("b/b.txt", "B")
            .with_file("c.txt", "C")
    }

    /// Root of the temporary directory.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Absolute path of `rel` under the root.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    /// Builder form of [`ScopeFixture::write`].
    pub fn with_file(self, rel: &str, content: impl AsRef<[u8]>) -> Self {
        self.write(rel, content);
        self
    }

    /// Write `content` to `rel`, creating parent directories.
    pub fn write(&self, rel: &str, content: impl AsRef<[u8]>) {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap_or_else(|e| panic!("Could not write {}: {}", path.display(), e));
    }

    /// Create an empty directory at `rel`.
    pub fn mkdir(&self, rel: &str) {
        fs::create_dir_all(self.path(rel)).unwrap();
    }

    /// Remove the file at `rel`.
    pub fn remove(&self, rel: &str) {
        let path = self.path(rel);
        fs::remove_file(&path).unwrap_or_else(|e| panic!("Could not remove {}: {}", path.display(), e));
    }

    /// Assert that the file at `rel` contains `content`.
    ///
    /// # Panics
    /// Panics if the file cannot be read or does not contain `content`.
    pub fn assert_file_contains(&self, rel: &str, content: &str) {
        let full_path = self.path(rel);
        let file_content = fs::read_to_string(&full_path)
            .unwrap_or_else(|_| panic!("Could not read file: {}", full_path.display()));
        assert!(
            file_content.contains(content),
            "File {} does not contain expected content.\nExpected: {}\nActual: {}",
            full_path.display(),
            content,
            file_content
        );
    }
}
