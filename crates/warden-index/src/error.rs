//! Error types for warden-index

/// Result type for warden-index operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in warden-index operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying SQLite failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The on-disk schema was written by another version
    #[error("Schema version mismatch: expected {expected}, found {actual}")]
    SchemaVersionMismatch { expected: u32, actual: u32 },

    /// A writer panicked while holding the index lock
    #[error("File index lock poisoned")]
    Poisoned,

    /// A stored row could not be decoded
    #[error("Invalid record {scope}/{path}: {message}")]
    InvalidRecord {
        scope: String,
        path: String,
        message: String,
    },
}
