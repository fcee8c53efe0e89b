//! End-to-end scenario: sync, modify, verify, tamper, sign
//!
//! A scope with `a.txt` = "A", `b/b.txt` = "B" and `c.txt` = "C" goes
//! through the whole publish and distribute cycle on a SQLite index.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use warden_core::manifest::canonical_bytes;
use warden_core::signer::verify;
use warden_core::{
    Ed25519Signer, EngineConfig, IntegrityEngine, IntegrityOutcome, ManifestSigner, SyncOutcome,
};
use warden_index::SqliteFileIndex;
use warden_test_utils::ScopeFixture;

const SCOPE: &str = "1.20.4";

fn engine(state: &ScopeFixture) -> IntegrityEngine {
    IntegrityEngine::new(
        EngineConfig::default(),
        Arc::new(SqliteFileIndex::open(state.path("index.db")).unwrap()),
        Arc::new(Ed25519Signer::generate()),
    )
    .unwrap()
}

fn sync(engine: &IntegrityEngine, fixture: &ScopeFixture) -> SyncOutcome {
    engine
        .sync_scope(SCOPE, fixture.root())
        .unwrap()
        .outcome()
        .expect("nothing else is syncing this scope")
}

#[test]
fn test_publish_verify_tamper_cycle() {
    let state = ScopeFixture::new();
    let fixture = ScopeFixture::abc();
    let engine = engine(&state);

    // First sync indexes every file
    assert_eq!(
        sync(&engine, &fixture),
        SyncOutcome {
            added: 3,
            updated: 0,
            errors: 0
        }
    );

    // A second sync with no changes does nothing
    assert_eq!(sync(&engine, &fixture), SyncOutcome::default());

    // Changing one file updates exactly one record
    fixture.write("b/b.txt", "B2");
    assert_eq!(
        sync(&engine, &fixture),
        SyncOutcome {
            added: 0,
            updated: 1,
            errors: 0
        }
    );

    // The freshly indexed content verifies
    assert_eq!(
        engine.verify_scope(SCOPE).unwrap(),
        IntegrityOutcome {
            total: 3,
            valid: 3,
            invalid: 0,
            interrupted: false
        }
    );

    // Overwriting a file behind the engine's back is caught by the gate
    fixture.write("c.txt", "C-tampered");
    assert!(!engine.verify_one(SCOPE, "c.txt").unwrap());
    let refusal = engine.authorize_download(SCOPE, "c.txt").unwrap_err();
    assert!(refusal.is_access_denied());

    // Untouched files are still served
    assert!(engine.verify_one(SCOPE, "a.txt").unwrap());
    assert!(engine.authorize_download(SCOPE, "a.txt").is_ok());

    let stats = engine.get_sync_stats(SCOPE).unwrap();
    assert_eq!(stats.total_files, 3);
    assert_eq!(stats.verified_files, 2);
    assert_eq!(stats.failed_files, 1);
}

#[test]
fn test_signature_round_trip() {
    let fixture = ScopeFixture::abc();
    let signer = Ed25519Signer::generate();
    let stranger = Ed25519Signer::generate();

    let state = ScopeFixture::new();
    let engine = engine(&state);
    let digest = engine
        .hash_directory(fixture.root(), &Default::default())
        .unwrap();
    assert!(digest.is_complete());

    let bytes = canonical_bytes(&digest.root).unwrap();
    let signature = signer.sign(&bytes).unwrap();

    assert!(verify(&bytes, &signature, &signer.public_key()));
    assert!(!verify(&bytes, &signature, &stranger.public_key()));

    let mut altered = bytes.clone();
    let last = altered.len() - 2;
    altered[last] ^= 0x01;
    assert!(!verify(&altered, &signature, &signer.public_key()));
}

#[test]
fn test_signed_manifest_travels_as_json() {
    let state = ScopeFixture::new();
    let fixture = ScopeFixture::abc();
    let engine = engine(&state);
    engine.register_scope(SCOPE, fixture.root());

    let signed = engine.signed_manifest(SCOPE).unwrap();
    let wire = serde_json::to_string(&signed).unwrap();
    let received: warden_core::SignedManifest = serde_json::from_str(&wire).unwrap();

    assert!(received.verify(&engine.public_key()));
    assert_eq!(received.manifest.get("b/b.txt").unwrap().size(), 1);
}
