//! Scope-relative paths with `/` separators on every platform

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A `/`-separated path, usually relative to a scope root.
///
/// Records are keyed by this form so a tree indexes identically on every
/// platform. It is turned back into a native path only by
/// [`NormalizedPath::under`], right before I/O.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct NormalizedPath {
    inner: String,
}

impl NormalizedPath {
    /// Normalize separators, dropping empty and `.` segments.
    ///
    /// `..` segments are kept so that [`NormalizedPath::is_contained`] can
    /// reject them. A leading `/` marks the path as absolute.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let raw = path.as_ref().to_string_lossy().replace('\\', "/");
        let mut inner = String::with_capacity(raw.len());
        if raw.starts_with('/') {
            inner.push('/');
        }
        for segment in raw.split('/').filter(|s| !s.is_empty() && *s != ".") {
            if !inner.is_empty() && !inner.ends_with('/') {
                inner.push('/');
            }
            inner.push_str(segment);
        }
        Self { inner }
    }

    /// `path` relative to `root`, or `None` if it is not strictly below it.
    pub fn relative(root: &Path, path: &Path) -> Option<Self> {
        let rel = Self::new(path.strip_prefix(root).ok()?);
        (!rel.inner.is_empty()).then_some(rel)
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Native path of this entry below `root`.
    pub fn under(&self, root: &Path) -> PathBuf {
        self.segments().fold(root.to_path_buf(), |mut out, segment| {
            out.push(segment);
            out
        })
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.inner.split('/').filter(|s| !s.is_empty())
    }

    /// Last segment.
    pub fn file_name(&self) -> Option<&str> {
        self.segments().last()
    }

    /// Text after the last `.` of the file name. Dotfiles have none.
    pub fn extension(&self) -> Option<&str> {
        match self.file_name()?.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => Some(ext),
            _ => None,
        }
    }

    /// Whether this path stays inside whatever directory it is resolved
    /// against: non-empty, relative, and free of `..`.
    ///
    /// Paths that come from remote clients must pass this before they are
    /// joined onto a scope root.
    pub fn is_contained(&self) -> bool {
        !self.inner.is_empty()
            && !self.inner.starts_with('/')
            && Path::new(&self.inner)
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

impl From<&str> for NormalizedPath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NormalizedPath {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<NormalizedPath> for String {
    fn from(value: NormalizedPath) -> Self {
        value.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a/b/c.txt", "a/b/c.txt")]
    #[case("a\\b\\c.txt", "a/b/c.txt")]
    #[case("./a//b/./c.txt", "a/b/c.txt")]
    #[case("/abs/path/", "/abs/path")]
    #[case("a/../b", "a/../b")]
    fn normalizes_separators_and_dots(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(NormalizedPath::new(input).as_str(), expected);
    }

    #[rstest]
    #[case("libraries/lwjgl.jar", true)]
    #[case("../secret", false)]
    #[case("a/../../b", false)]
    #[case("/etc/passwd", false)]
    #[case("", false)]
    fn containment_rejects_escapes(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(NormalizedPath::new(input).is_contained(), expected);
    }

    #[test]
    fn relative_strips_root() {
        let root = Path::new("/srv/scopes/1.20");
        let file = Path::new("/srv/scopes/1.20/libraries/a.jar");
        let rel = NormalizedPath::relative(root, file).unwrap();
        assert_eq!(rel.as_str(), "libraries/a.jar");
        assert!(NormalizedPath::relative(root, root).is_none());
        assert!(NormalizedPath::relative(root, Path::new("/elsewhere/a")).is_none());
    }

    #[test]
    fn under_resolves_segments() {
        let rel = NormalizedPath::new("b/b.txt");
        let abs = rel.under(Path::new("/root"));
        assert_eq!(abs, Path::new("/root").join("b").join("b.txt"));
    }

    #[rstest]
    #[case("natives/lwjgl.dll", Some("lwjgl.dll"), Some("dll"))]
    #[case("archive.tar.gz", Some("archive.tar.gz"), Some("gz"))]
    #[case("config/.hidden", Some(".hidden"), None)]
    #[case("Makefile", Some("Makefile"), None)]
    #[case("", None, None)]
    fn file_name_and_extension(
        #[case] input: &str,
        #[case] name: Option<&str>,
        #[case] extension: Option<&str>,
    ) {
        let path = NormalizedPath::new(input);
        assert_eq!(path.file_name(), name);
        assert_eq!(path.extension(), extension);
    }

    #[test]
    fn serializes_as_plain_string() {
        let path = NormalizedPath::new("mods\\a.jar");
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"mods/a.jar\"");
        let back: NormalizedPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }
}
