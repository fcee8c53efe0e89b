//! The engine facade called by serving and admin layers

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};
use warden_fs::{DigestOptions, DirectoryDigest, NormalizedPath, PathFilter, hash_directory};
use warden_index::{FileIndex, MemoryFileIndex, SqliteFileIndex, SyncStats};

use crate::config::EngineConfig;
use crate::manifest::{self, SignedManifest};
use crate::scope::ScopeRegistry;
use crate::signer::{Ed25519Signer, ManifestSigner, PUBLIC_KEY_LENGTH};
use crate::sync::{SyncCoordinator, SyncOptions, SyncRun};
use crate::verify::{DownloadGate, DownloadTicket, IntegrityOutcome, IntegrityVerifier};
use crate::watcher::{ChangeWatcher, ScopeHint, WatchHandle};
use crate::{Error, Result};

/// Directory integrity and synchronization engine.
///
/// Owns the file index, the scope registry and the signing key, and exposes
/// every operation the serving layer needs.
pub struct IntegrityEngine {
    config: EngineConfig,
    index: Arc<dyn FileIndex>,
    scopes: Arc<ScopeRegistry>,
    sync: Arc<SyncCoordinator>,
    verifier: Arc<IntegrityVerifier>,
    gate: DownloadGate,
    signer: Arc<dyn ManifestSigner>,
    shutdown: Arc<AtomicBool>,
}

impl IntegrityEngine {
    /// Build an engine from explicit parts.
    pub fn new(
        config: EngineConfig,
        index: Arc<dyn FileIndex>,
        signer: Arc<dyn ManifestSigner>,
    ) -> Result<Self> {
        config.validate()?;

        let options = config.digest_options()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let sync = Arc::new(SyncCoordinator::new(
            index.clone(),
            SyncOptions {
                chunk_size: options.chunk_size,
                parallel: options.parallel,
                filter: options.filter,
            },
        ));
        let verifier = Arc::new(
            IntegrityVerifier::new(index.clone())
                .with_chunk_size(config.digest.chunk_size)
                .with_parallel(config.digest.parallel)
                .with_shutdown(shutdown.clone()),
        );
        let gate = DownloadGate::new(verifier.clone(), &config.integrity.critical, config.digest.chunk_size)?;

        let scopes = Arc::new(ScopeRegistry::new());
        for (scope, root) in &config.scopes {
            scopes.register(scope.clone(), canonical(root));
        }

        Ok(Self {
            config,
            index,
            scopes,
            sync,
            verifier,
            gate,
            signer,
            shutdown,
        })
    }

    /// Build an engine from configuration alone.
    ///
    /// Opens the SQLite index at `[index].path` (in memory when unset) and
    /// loads the key at `[signing].key_path`, generating it on first use.
    /// Without a key path an ephemeral key is generated for this process.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        let index: Arc<dyn FileIndex> = match &config.index.path {
            Some(path) => Arc::new(SqliteFileIndex::open(path)?),
            None => {
                debug!("No index path configured, using in-memory index");
                Arc::new(MemoryFileIndex::new())
            }
        };
        let signer = match &config.signing.key_path {
            Some(path) => Ed25519Signer::load_or_generate(path)?,
            None => {
                warn!("No signing key configured, manifests are signed with an ephemeral key");
                Ed25519Signer::generate()
            }
        };
        Self::new(config, index, Arc::new(signer))
    }

    /// Load a configuration file and build an engine from it.
    pub fn open(config_path: &Path) -> Result<Self> {
        Self::from_config(EngineConfig::load(config_path)?)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scopes(&self) -> &ScopeRegistry {
        &self.scopes
    }

    /// Register a scope root, replacing any earlier one.
    pub fn register_scope(&self, scope: &str, root: &Path) {
        let root = canonical(root);
        if let Some(previous) = self.scopes.register(scope, root.clone())
            && previous != root
        {
            info!(scope = %scope, from = %previous.display(), to = %root.display(), "Scope moved");
        }
    }

    fn root_of(&self, scope: &str) -> Result<PathBuf> {
        let root = self.scopes.root(scope)?;
        if !root.is_dir() {
            return Err(Error::ScopeRootMissing {
                scope: scope.to_string(),
                path: root,
            });
        }
        Ok(root)
    }

    /// Hash a directory with the configured digest settings and `filter`.
    pub fn hash_directory(&self, root: &Path, filter: &PathFilter) -> Result<DirectoryDigest> {
        let options = DigestOptions {
            chunk_size: self.config.digest.chunk_size,
            parallel: self.config.digest.parallel,
            filter: filter.compile()?,
        };
        Ok(hash_directory(root, &options)?)
    }

    /// Sign arbitrary manifest bytes with the engine's key.
    pub fn sign(&self, manifest: &[u8]) -> Result<Vec<u8>> {
        self.signer.sign(manifest)
    }

    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.signer.public_key()
    }

    /// Hash a scope's directory and sign the result.
    pub fn signed_manifest(&self, scope: &str) -> Result<SignedManifest> {
        let root = self.root_of(scope)?;
        manifest::sign_directory(&root, &self.config.digest_options()?, self.signer.as_ref())
    }

    /// Sign the tree recorded in the index, without reading the disk.
    pub fn signed_manifest_from_index(&self, scope: &str) -> Result<SignedManifest> {
        let tree = manifest::tree_from_index(self.index.as_ref(), scope)?;
        SignedManifest::sign(tree, self.signer.as_ref())
    }

    /// Sync a scope rooted at `root`, registering the scope on the way.
    pub fn sync_scope(&self, scope: &str, root: &Path) -> Result<SyncRun> {
        self.register_scope(scope, root);
        self.sync.sync_scope(scope, &self.scopes.root(scope)?)
    }

    /// Sync a scope that is already registered.
    pub fn sync_registered(&self, scope: &str) -> Result<SyncRun> {
        let root = self.scopes.root(scope)?;
        self.sync.sync_scope(scope, &root)
    }

    pub fn verify_scope(&self, scope: &str) -> Result<IntegrityOutcome> {
        let root = self.root_of(scope)?;
        self.verifier.verify_scope(scope, &root)
    }

    pub fn verify_one(&self, scope: &str, path: &str) -> Result<bool> {
        let root = self.scopes.root(scope)?;
        self.verifier.verify_one(scope, &root, &NormalizedPath::new(path))
    }

    /// Gate a download. See [`DownloadGate::authorize`].
    pub fn authorize_download(&self, scope: &str, path: &str) -> Result<DownloadTicket> {
        let root = self.scopes.root(scope)?;
        self.gate.authorize(scope, &root, &NormalizedPath::new(path))
    }

    pub fn get_sync_stats(&self, scope: &str) -> Result<SyncStats> {
        Ok(self.index.stats(scope)?)
    }

    /// Remove records of files that are gone from the scope's directory.
    pub fn prune_missing(&self, scope: &str) -> Result<usize> {
        let root = self.root_of(scope)?;
        self.sync.prune_missing(scope, &root)
    }

    /// Delete every record of a scope and forget its root.
    pub fn forget_scope(&self, scope: &str) -> Result<usize> {
        let removed = self.index.delete_all_by_scope(scope)?;
        self.scopes.unregister(scope);
        info!(scope = %scope, removed, "Scope forgotten");
        Ok(removed)
    }

    /// Watch a staging directory and sync scopes as their files change.
    ///
    /// A changed subtree syncs the registered scope containing it; an
    /// unregistered top-level directory becomes a scope named after itself.
    /// Returns `None` when the watcher is disabled in configuration.
    pub fn watch(&self, staging_root: &Path) -> Option<WatchHandle> {
        if !self.config.watcher.enabled {
            info!("Change watcher disabled in configuration");
            return None;
        }

        let scopes = self.scopes.clone();
        let sync = self.sync.clone();
        let on_batch = move |hint: ScopeHint| {
            let path = hint.path();
            let scope = match (scopes.scope_containing(&path), hint.subtree) {
                (Some(scope), _) => scope,
                (None, Some(name)) => {
                    info!(scope = %name, root = %path.display(), "Registering scope from staging directory");
                    scopes.register(name.clone(), path);
                    name
                }
                (None, None) => {
                    debug!(root = %path.display(), "change outside any scope");
                    return;
                }
            };
            let Ok(root) = scopes.root(&scope) else {
                return;
            };
            match sync.sync_scope(&scope, &root) {
                Ok(SyncRun::Completed(outcome)) => {
                    debug!(scope = %scope, ?outcome, "watcher-triggered sync finished")
                }
                Ok(SyncRun::Coalesced) => {}
                Err(e) => warn!(scope = %scope, error = %e, "watcher-triggered sync failed"),
            }
        };

        Some(ChangeWatcher::start(
            staging_root,
            self.config.watcher.debounce(),
            on_batch,
        ))
    }

    /// Ask long-running verification to stop at the next record.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn canonical(root: &Path) -> PathBuf {
    dunce::canonicalize(root).unwrap_or_else(|_| root.to_path_buf())
}
