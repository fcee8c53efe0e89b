//! The check every download passes before a byte is sent

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use warden_fs::filter::CompiledFilter;
use warden_fs::{NormalizedPath, PathFilter, hash_file_with};

use super::verifier::{IntegrityVerifier, Observation};
use crate::{Error, Result};

/// Permission to serve one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DownloadTicket {
    /// Stream this file; its content matched the index moments ago
    Local {
        path: PathBuf,
        hash: String,
        size: u64,
    },
    /// Send the client to an external location instead
    Redirect { url: String },
}

/// Integrity gate in front of file transfers.
///
/// Files matching one of the `critical` patterns get a second, unconditional
/// re-hash after the ordinary check. A failure on a critical file is treated
/// as tampering rather than a plain refusal.
pub struct DownloadGate {
    verifier: Arc<IntegrityVerifier>,
    critical: CompiledFilter,
    chunk_size: usize,
}

impl DownloadGate {
    pub fn new(verifier: Arc<IntegrityVerifier>, critical: &[String], chunk_size: usize) -> Result<Self> {
        let critical = PathFilter {
            include_only: critical.to_vec(),
            exclude: Vec::new(),
        }
        .compile()?;
        Ok(Self {
            verifier,
            critical,
            chunk_size,
        })
    }

    pub fn is_critical(&self, path: &NormalizedPath) -> bool {
        self.critical.has_includes() && self.critical.keeps_file(path.as_str())
    }

    /// Decide whether `path` in `scope` may be served.
    ///
    /// # Errors
    ///
    /// - `AccessDenied` when the path is unknown, outside the scope, or its
    ///   content no longer matches the index.
    /// - `TamperDetected` when the failing file is critical.
    pub fn authorize(&self, scope: &str, root: &Path, path: &NormalizedPath) -> Result<DownloadTicket> {
        let denied = || Error::AccessDenied {
            scope: scope.to_string(),
            path: path.to_string(),
        };

        let Some(record) = self.verifier.find(scope, path)? else {
            return Err(denied());
        };
        if let Some(url) = record.download_url.clone() {
            debug!(scope = %scope, path = %path, url = %url, "redirecting download");
            return Ok(DownloadTicket::Redirect { url });
        }

        let checked = self.verifier.check_record(scope, root, record);
        let record = checked.record;

        let critical = self.is_critical(path);
        if !checked.observation.is_valid() {
            if critical {
                return Err(self.tampered(scope, path, record.content_hash(), &checked.observation));
            }
            warn!(scope = %scope, path = %path, "Refusing download of file that failed integrity check");
            return Err(denied());
        }

        let abs = path.under(root);
        if critical {
            let observation = match hash_file_with(&abs, self.chunk_size) {
                Ok(digest) if record.matches(&digest) => Observation::Match,
                Ok(digest) => Observation::Mismatch { actual: digest },
                Err(e) => Observation::Unreadable {
                    message: e.to_string(),
                },
            };
            if !observation.is_valid() {
                return Err(self.tampered(scope, path, record.content_hash(), &observation));
            }
        }

        Ok(DownloadTicket::Local {
            path: abs,
            hash: record.content_hash().to_string(),
            size: record.size_bytes(),
        })
    }

    fn tampered(&self, scope: &str, path: &NormalizedPath, expected: &str, observation: &Observation) -> Error {
        let actual = observation.actual_hash(expected);
        error!(
            scope = %scope,
            path = %path,
            expected = %expected,
            actual = %actual,
            "CRITICAL FILE TAMPERING SUSPECTED, refusing to serve"
        );
        Error::TamperDetected {
            scope: scope.to_string(),
            path: path.to_string(),
            expected: expected.to_string(),
            actual,
        }
    }
}
