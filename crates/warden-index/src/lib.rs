//! Persistent file index for warden
//!
//! Stores one [`FileRecord`] per tracked file, keyed by `(scope_id,
//! relative_path)`. The index is pure persistence: it never touches the
//! files it describes. Two backends implement [`FileIndex`]:
//!
//! - [`SqliteFileIndex`]: durable storage with a unique index for point lookups
//! - [`MemoryFileIndex`]: process-local storage for tests and ephemeral runs

pub mod error;
pub mod memory;
pub mod record;
mod schema;
pub mod sqlite;
pub mod store;

pub use error::{Error, Result};
pub use memory::MemoryFileIndex;
pub use record::{FileRecord, FileType, SyncStats};
pub use sqlite::SqliteFileIndex;
pub use store::FileIndex;
