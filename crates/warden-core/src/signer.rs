//! Manifest signing
//!
//! The engine never reaches for a global key: callers hand it something that
//! implements [`ManifestSigner`]. [`Ed25519Signer`] is the production
//! implementation; tests can generate a throwaway one with
//! [`Ed25519Signer::generate`].

use std::path::Path;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use tracing::{debug, info};
use warden_fs::io::{Visibility, read_text, write_atomic_with};

use crate::{Error, Result};

/// Length of an Ed25519 public key in bytes
pub const PUBLIC_KEY_LENGTH: usize = ed25519_dalek::PUBLIC_KEY_LENGTH;

/// Produces signatures over canonical manifest bytes.
pub trait ManifestSigner: Send + Sync {
    /// Sign a serialized manifest.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;

    /// Public half of the signing key, as distributed to clients.
    fn public_key(&self) -> [u8; PUBLIC_KEY_LENGTH];
}

/// Check a signature against a public key.
///
/// Malformed keys or signatures simply fail verification.
pub fn verify(message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
    let Ok(key_bytes) = <[u8; PUBLIC_KEY_LENGTH]>::try_from(public_key) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(message, &signature).is_ok()
}

/// Ed25519 signing key held by the server.
pub struct Ed25519Signer {
    key: SigningKey,
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

impl Ed25519Signer {
    /// Generate a fresh key from the operating system's RNG.
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Build a signer from a 32-byte secret key.
    pub fn from_bytes(secret: &[u8]) -> Result<Self> {
        let secret: [u8; 32] = secret.try_into().map_err(|_| Error::Signing {
            message: format!("secret key must be 32 bytes, got {}", secret.len()),
        })?;
        Ok(Self {
            key: SigningKey::from_bytes(&secret),
        })
    }

    /// Load a hex-encoded secret key file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = read_text(path)?;
        let secret = hex::decode(text.trim()).map_err(|e| Error::Signing {
            message: format!("{} is not a hex key: {}", path.display(), e),
        })?;
        let signer = Self::from_bytes(&secret)?;
        debug!(path = %path.display(), public_key = %signer.public_key_hex(), "loaded signing key");
        Ok(signer)
    }

    /// Load the key at `path`, creating and saving a new one if it is absent.
    pub fn load_or_generate(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        let signer = Self::generate();
        signer.save(path)?;
        info!(path = %path.display(), public_key = %signer.public_key_hex(), "generated signing key");
        Ok(signer)
    }

    /// Write the secret key as hex, readable only by the owner.
    pub fn save(&self, path: &Path) -> Result<()> {
        let encoded = hex::encode(self.key.to_bytes());
        write_atomic_with(path, encoded.as_bytes(), Visibility::OwnerOnly)?;
        Ok(())
    }

    /// Public key as lowercase hex, for embedding in clients.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.key.verifying_key().to_bytes())
    }
}

impl ManifestSigner for Ed25519Signer {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        Ok(self.key.sign(message).to_bytes().to_vec())
    }

    fn public_key(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.key.verifying_key().to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trips() {
        let signer = Ed25519Signer::generate();
        let signature = signer.sign(b"manifest").unwrap();
        assert!(verify(b"manifest", &signature, &signer.public_key()));
    }

    #[test]
    fn altered_message_or_foreign_key_fails() {
        let signer = Ed25519Signer::generate();
        let other = Ed25519Signer::generate();
        let signature = signer.sign(b"manifest").unwrap();

        assert!(!verify(b"manifesT", &signature, &signer.public_key()));
        assert!(!verify(b"manifest", &signature, &other.public_key()));
    }

    #[test]
    fn malformed_inputs_fail_verification() {
        let signer = Ed25519Signer::generate();
        let signature = signer.sign(b"m").unwrap();

        assert!(!verify(b"m", &signature[..10], &signer.public_key()));
        assert!(!verify(b"m", &signature, &[0u8; 5]));
    }

    #[test]
    fn wrong_secret_length_is_rejected() {
        assert!(matches!(
            Ed25519Signer::from_bytes(&[1u8; 16]),
            Err(Error::Signing { .. })
        ));
    }

    #[test]
    fn save_and_load_keep_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.key");

        let signer = Ed25519Signer::generate();
        signer.save(&path).unwrap();
        let loaded = Ed25519Signer::load(&path).unwrap();

        assert_eq!(loaded.public_key(), signer.public_key());
        assert_eq!(loaded.public_key_hex().len(), PUBLIC_KEY_LENGTH * 2);
    }

    #[test]
    fn load_or_generate_persists_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("manifest.key");

        let first = Ed25519Signer::load_or_generate(&path).unwrap();
        let second = Ed25519Signer::load_or_generate(&path).unwrap();
        assert_eq!(first.public_key(), second.public_key());
    }

    #[test]
    fn garbage_key_file_is_a_signing_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.key");
        std::fs::write(&path, "not hex").unwrap();

        assert!(matches!(
            Ed25519Signer::load(&path),
            Err(Error::Signing { .. })
        ));
    }
}
