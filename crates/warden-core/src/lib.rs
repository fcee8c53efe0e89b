//! Directory integrity and synchronization engine
//!
//! Turns staged game-client directories into signed manifests, keeps the
//! file index in line with what is on disk, and checks every file again
//! right before it is served.
//!
//! # Architecture
//!
//! - [`sync`]: walks a scope and records additions and changes in the index
//! - [`verify`]: re-hashes indexed files, flags mismatches, gates downloads
//! - [`manifest`] and [`signer`]: canonical hash trees and Ed25519 signatures
//! - [`watcher`]: debounced change notifications that trigger syncs
//! - [`IntegrityEngine`]: one facade over all of the above
//!
//! # Example
//!
//! ```ignore
//! use warden_core::{EngineConfig, IntegrityEngine};
//!
//! let engine = IntegrityEngine::from_config(EngineConfig::default())?;
//! engine.sync_scope("1.20.4", "/srv/staging/1.20.4".as_ref())?;
//! let ticket = engine.authorize_download("1.20.4", "client.jar")?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod scope;
pub mod signer;
pub mod sync;
pub mod verify;
pub mod watcher;

pub use config::EngineConfig;
pub use engine::IntegrityEngine;
pub use error::{Error, Result};
pub use manifest::SignedManifest;
pub use scope::ScopeRegistry;
pub use signer::{Ed25519Signer, ManifestSigner};
pub use sync::{SyncCoordinator, SyncOutcome, SyncRun};
pub use verify::{DownloadGate, DownloadTicket, IntegrityOutcome, IntegrityVerifier};
pub use watcher::{ChangeWatcher, ScopeHint, WatchHandle};

// Re-exports for convenience
pub use warden_fs::{DirectoryDigest, HashNode, PathFilter};
pub use warden_index::{FileIndex, FileRecord, SyncStats};
