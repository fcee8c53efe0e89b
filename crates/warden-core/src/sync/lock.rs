//! Non-blocking per-scope locks

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Slot {
    pending: bool,
}

/// In-process registry of scopes that are currently being synced.
///
/// Acquisition never blocks. A caller that finds the scope held can leave a
/// single pending re-run behind for the holder to pick up.
#[derive(Debug, Clone, Default)]
pub struct ScopeLocks {
    held: Arc<Mutex<HashMap<String, Slot>>>,
}

/// Outcome of [`ScopeLocks::try_acquire`].
#[derive(Debug)]
pub enum Acquire {
    Acquired(ScopeGuard),
    /// Another holder is active; a re-run was queued if requested
    Busy,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Try to take the lock for `scope`.
    ///
    /// When the scope is held and `queue_rerun` is set, the holder is asked
    /// to run once more before releasing. Repeated requests collapse into one.
    pub fn try_acquire(&self, scope: &str, queue_rerun: bool) -> Acquire {
        let mut slots = self.slots();
        if let Some(slot) = slots.get_mut(scope) {
            slot.pending |= queue_rerun;
            return Acquire::Busy;
        }
        slots.insert(scope.to_string(), Slot::default());
        Acquire::Acquired(ScopeGuard {
            locks: self.clone(),
            scope: scope.to_string(),
            released: false,
        })
    }

    pub fn is_held(&self, scope: &str) -> bool {
        self.slots().contains_key(scope)
    }
}

/// Exclusive hold on one scope, released on drop.
#[derive(Debug)]
pub struct ScopeGuard {
    locks: ScopeLocks,
    scope: String,
    released: bool,
}

impl ScopeGuard {
    /// Either claim a queued re-run or release the lock, as one step.
    ///
    /// Returns `true` when a re-run was pending; the lock is then still held
    /// and the caller must run again. Returns `false` once the lock is gone.
    pub fn release_or_rerun(&mut self) -> bool {
        if self.released {
            return false;
        }
        let mut slots = self.locks.slots();
        if let Some(slot) = slots.get_mut(&self.scope)
            && slot.pending
        {
            slot.pending = false;
            return true;
        }
        slots.remove(&self.scope);
        self.released = true;
        false
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if !self.released {
            self.locks.slots().remove(&self.scope);
        }
    }
}
