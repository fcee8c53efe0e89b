//! Filesystem primitives for warden
//!
//! Provides the digest engine (file and directory hash trees), glob-based
//! path filters, symlink-safe directory walking and safe I/O operations.

pub mod config;
pub mod digest;
pub mod error;
pub mod filter;
pub mod io;
pub mod path;
pub mod walk;

pub use config::ConfigStore;
pub use digest::{
    DigestFailure, DigestOptions, DirectoryDigest, FileDigest, HashNode, hash_directory,
    hash_file, hash_file_with,
};
pub use error::{Error, Result};
pub use filter::PathFilter;
pub use path::NormalizedPath;
pub use walk::{WalkFailure, WalkReport, WalkedFile, walk_files};
