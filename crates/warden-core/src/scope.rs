//! Scope registry: where each scope's files live on disk

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::{Error, Result};

/// Maps scope ids to their root directories.
#[derive(Debug, Default)]
pub struct ScopeRegistry {
    roots: RwLock<BTreeMap<String, PathBuf>>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(roots: BTreeMap<String, PathBuf>) -> Self {
        Self {
            roots: RwLock::new(roots),
        }
    }

    /// Register or move a scope. Returns the previous root, if any.
    pub fn register(&self, scope: impl Into<String>, root: impl Into<PathBuf>) -> Option<PathBuf> {
        let mut roots = self.roots.write().unwrap_or_else(|e| e.into_inner());
        roots.insert(scope.into(), root.into())
    }

    pub fn unregister(&self, scope: &str) -> Option<PathBuf> {
        let mut roots = self.roots.write().unwrap_or_else(|e| e.into_inner());
        roots.remove(scope)
    }

    /// Root directory of a scope.
    ///
    /// # Errors
    ///
    /// `UnknownScope` if the scope was never registered.
    pub fn root(&self, scope: &str) -> Result<PathBuf> {
        let roots = self.roots.read().unwrap_or_else(|e| e.into_inner());
        roots.get(scope).cloned().ok_or_else(|| Error::UnknownScope {
            scope: scope.to_string(),
        })
    }

    /// The scope whose root contains `path`, preferring the deepest root.
    pub fn scope_containing(&self, path: &Path) -> Option<String> {
        let roots = self.roots.read().unwrap_or_else(|e| e.into_inner());
        roots
            .iter()
            .filter(|(_, root)| path.starts_with(root))
            .max_by_key(|(_, root)| root.components().count())
            .map(|(scope, _)| scope.clone())
    }

    pub fn scopes(&self) -> Vec<String> {
        let roots = self.roots.read().unwrap_or_else(|e| e.into_inner());
        roots.keys().cloned().collect()
    }
}
