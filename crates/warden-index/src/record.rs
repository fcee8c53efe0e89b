//! File record types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_fs::{FileDigest, NormalizedPath};

/// Classification of a tracked file, derived from its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Java libraries and mods
    Library,
    /// Platform-native shared objects
    Native,
    /// Textures, sounds, fonts, asset indexes
    Asset,
    /// Text configuration
    Config,
    /// The client itself: top-level jars and launch binaries
    Executable,
    Other,
}

impl FileType {
    /// Classify a file by its relative path.
    pub fn classify(path: &NormalizedPath) -> Self {
        let extension = path.extension().map(str::to_ascii_lowercase).unwrap_or_default();
        let under = |dir: &str| path.segments().any(|s| s.eq_ignore_ascii_case(dir));

        match extension.as_str() {
            "dll" | "so" | "dylib" | "jnilib" => Self::Native,
            _ if under("natives") => Self::Native,
            _ if under("assets") => Self::Asset,
            "jar" if under("libraries") || under("mods") => Self::Library,
            "jar" | "exe" | "app" | "sh" | "bat" | "cmd" => Self::Executable,
            "png" | "jpg" | "jpeg" | "ogg" | "wav" | "mp3" | "ttf" | "otf" => Self::Asset,
            "json" | "toml" | "properties" | "cfg" | "conf" | "ini" | "txt" | "yml" | "yaml"
            | "xml" | "options" => Self::Config,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Library => "library",
            Self::Native => "native",
            Self::Asset => "asset",
            Self::Config => "config",
            Self::Executable => "executable",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "library" => Ok(Self::Library),
            "native" => Ok(Self::Native),
            "asset" => Ok(Self::Asset),
            "config" => Ok(Self::Config),
            "executable" => Ok(Self::Executable),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown file type '{}'", other)),
        }
    }
}

/// Persisted metadata about one tracked file.
///
/// `content_hash` and `size_bytes` always come from the same read of the
/// file and are only ever changed together, through [`FileRecord::observe`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Storage-assigned identifier; `None` until first persisted
    pub id: Option<i64>,
    pub scope_id: String,
    pub relative_path: NormalizedPath,
    content_hash: String,
    size_bytes: u64,
    pub file_type: FileType,
    pub verified: bool,
    pub integrity_check_failed: bool,
    /// External location clients are redirected to instead of this server
    pub download_url: Option<String>,
    last_synced_at: DateTime<Utc>,
}

impl FileRecord {
    /// Create an unverified record for a newly observed file.
    pub fn new(scope_id: impl Into<String>, relative_path: NormalizedPath, digest: FileDigest) -> Self {
        let file_type = FileType::classify(&relative_path);
        Self {
            id: None,
            scope_id: scope_id.into(),
            relative_path,
            content_hash: digest.hash,
            size_bytes: digest.size,
            file_type,
            verified: false,
            integrity_check_failed: false,
            download_url: None,
            last_synced_at: Utc::now(),
        }
    }

    /// Rebuild a record from stored columns.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: i64,
        scope_id: String,
        relative_path: NormalizedPath,
        digest: FileDigest,
        file_type: FileType,
        verified: bool,
        integrity_check_failed: bool,
        download_url: Option<String>,
        last_synced_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Some(id),
            scope_id,
            relative_path,
            content_hash: digest.hash,
            size_bytes: digest.size,
            file_type,
            verified,
            integrity_check_failed,
            download_url,
            last_synced_at,
        }
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn last_synced_at(&self) -> DateTime<Utc> {
        self.last_synced_at
    }

    /// Whether a fresh digest describes the same content as this record.
    pub fn matches(&self, digest: &FileDigest) -> bool {
        self.content_hash == digest.hash && self.size_bytes == digest.size
    }

    /// Record a new observation of the file on disk.
    ///
    /// A changed file must be re-verified before it is trusted again, so
    /// both verification flags are cleared. Returns `false` and leaves the
    /// record untouched when the content is unchanged.
    pub fn observe(&mut self, digest: FileDigest) -> bool {
        if self.matches(&digest) {
            return false;
        }
        self.content_hash = digest.hash;
        self.size_bytes = digest.size;
        self.verified = false;
        self.integrity_check_failed = false;
        self.last_synced_at = Utc::now();
        true
    }

    /// Set the outcome of an integrity check. Returns whether anything changed.
    ///
    /// A failed check also withdraws any earlier verification.
    pub fn set_integrity(&mut self, valid: bool) -> bool {
        let (verified, failed) = (valid, !valid);
        let changed = self.verified != verified || self.integrity_check_failed != failed;
        self.verified = verified;
        self.integrity_check_failed = failed;
        changed
    }
}

/// Aggregate view over the records of one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub total_files: u64,
    pub verified_files: u64,
    pub failed_files: u64,
    pub last_sync: Option<DateTime<Utc>>,
}

impl SyncStats {
    /// Compute stats from a list of records.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a FileRecord>) -> Self {
        records.into_iter().fold(Self::default(), |mut stats, record| {
            stats.total_files += 1;
            stats.verified_files += u64::from(record.verified);
            stats.failed_files += u64::from(record.integrity_check_failed);
            stats.last_sync = stats.last_sync.max(Some(record.last_synced_at));
            stats
        })
    }
}
