//! Error types for warden-core

use std::path::PathBuf;

/// Result type for warden-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in warden-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No root directory is registered for the scope
    #[error("Unknown scope: {scope}")]
    UnknownScope { scope: String },

    /// The scope's root directory does not exist or is not a directory
    #[error("Root of scope {scope} is missing: {path}")]
    ScopeRootMissing { scope: String, path: PathBuf },

    /// An exclusive operation could not start because the scope is syncing
    #[error("Scope {scope} is busy with another sync")]
    ScopeBusy { scope: String },

    /// The integrity gate refused to hand out a file
    #[error("Access denied to {scope}/{path}")]
    AccessDenied { scope: String, path: String },

    /// A critical file no longer matches its indexed digest
    #[error("Critical file {scope}/{path} failed integrity check: expected {expected}, found {actual}")]
    TamperDetected {
        scope: String,
        path: String,
        expected: String,
        actual: String,
    },

    /// The tree could not be hashed completely, so it must not be signed
    #[error("Manifest for {root} is incomplete: {failures} entries could not be read")]
    IncompleteManifest { root: PathBuf, failures: usize },

    /// Key material could not be produced or used
    #[error("Signing error: {message}")]
    Signing { message: String },

    /// A freshly produced signature did not verify against our own key
    #[error("Signature rejected by the signer's own public key")]
    SignatureRejected,

    /// Configuration failed validation
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // Transparent wrappers for underlying crate errors
    /// Filesystem error from warden-fs
    #[error(transparent)]
    Fs(#[from] warden_fs::Error),

    /// Persistence error from warden-index
    #[error(transparent)]
    Index(#[from] warden_index::Error),

    /// JSON serialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error should be reported to a remote client as a refusal
    /// rather than a server fault.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }
}
