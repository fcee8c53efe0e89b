//! Signed manifests
//!
//! A manifest is a [`HashNode`] tree serialized canonically: children live in
//! ordered maps and the tree carries no timestamps, so the same content always
//! produces the same bytes and therefore the same signature input.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use warden_fs::{DigestOptions, FileDigest, HashNode, hash_directory};
use warden_index::FileIndex;

use crate::signer::{self, ManifestSigner};
use crate::{Error, Result};

/// Canonical byte form of a hash tree.
pub fn canonical_bytes(manifest: &HashNode) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(manifest)?)
}

/// A hash tree plus a signature over its canonical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedManifest {
    pub manifest: HashNode,
    pub signature: Vec<u8>,
}

impl SignedManifest {
    /// Sign a tree and check the result against the signer's own public key.
    ///
    /// # Errors
    ///
    /// `SignatureRejected` if the signature does not verify; a manifest the
    /// engine cannot verify itself is never handed out.
    pub fn sign(manifest: HashNode, signer: &dyn ManifestSigner) -> Result<Self> {
        let bytes = canonical_bytes(&manifest)?;
        let signature = signer.sign(&bytes)?;

        if !signer::verify(&bytes, &signature, &signer.public_key()) {
            error!(root_hash = %manifest.hash(), "Signer produced a signature its own key rejects");
            return Err(Error::SignatureRejected);
        }

        debug!(root_hash = %manifest.hash(), files = manifest.file_count(), "signed manifest");
        Ok(Self {
            manifest,
            signature,
        })
    }

    /// Verify this manifest against a public key.
    pub fn verify(&self, public_key: &[u8]) -> bool {
        match canonical_bytes(&self.manifest) {
            Ok(bytes) => signer::verify(&bytes, &self.signature, public_key),
            Err(_) => false,
        }
    }

    pub fn signature_hex(&self) -> String {
        hex::encode(&self.signature)
    }
}

/// Hash `root` and sign the resulting tree.
///
/// # Errors
///
/// `IncompleteManifest` when any entry could not be hashed.
pub fn sign_directory(
    root: &Path,
    options: &DigestOptions,
    signer: &dyn ManifestSigner,
) -> Result<SignedManifest> {
    let digest = hash_directory(root, options)?;
    if !digest.is_complete() {
        for failure in &digest.failures {
            warn!(path = %failure.path, error = %failure.message, "unreadable entry blocks signing");
        }
        return Err(Error::IncompleteManifest {
            root: root.to_path_buf(),
            failures: digest.failures.len(),
        });
    }
    SignedManifest::sign(digest.root, signer)
}

/// Build a tree from the indexed records of a scope.
///
/// This trusts the index: nothing is read from disk.
pub fn tree_from_index(index: &dyn FileIndex, scope: &str) -> Result<HashNode> {
    let records = index.list_by_scope(scope)?;
    Ok(HashNode::from_files(records.into_iter().map(|record| {
        let digest = FileDigest {
            hash: record.content_hash().to_string(),
            size: record.size_bytes(),
        };
        (record.relative_path, digest)
    })))
}
