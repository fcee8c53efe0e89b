//! Sync coordination
//!
//! [`SyncCoordinator`] brings the file index in line with what is on disk,
//! one scope at a time, under a non-blocking per-scope lock.

mod coordinator;
mod lock;

pub use coordinator::{SyncCoordinator, SyncOptions, SyncOutcome, SyncRun};
pub use lock::{Acquire, ScopeGuard, ScopeLocks};
