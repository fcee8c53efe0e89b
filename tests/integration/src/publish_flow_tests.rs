//! Operator-facing flows across a restart

use std::sync::Arc;

use warden_core::{EngineConfig, Error, IntegrityEngine};
use warden_fs::{HashNode, PathFilter};
use warden_index::{FileIndex, SqliteFileIndex};
use warden_test_utils::ScopeFixture;

fn config(state: &ScopeFixture, staging: &ScopeFixture) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.index.path = Some(state.path("index.db"));
    config.signing.key_path = Some(state.path("keys/manifest.key"));
    config.filter = PathFilter::new().exclude("*.tmp").exclude("logs");
    config
        .scopes
        .insert("1.20".into(), staging.path("1.20"));
    config
}

#[test]
fn test_state_survives_restart() {
    let state = ScopeFixture::new();
    let staging = ScopeFixture::new()
        .with_file("1.20/client.jar", "PK client")
        .with_file("1.20/mods/sodium.jar", "PK sodium")
        .with_file("1.20/logs/latest.log", "log")
        .with_file("1.20/download.tmp", "partial");

    let public_key = {
        let engine = IntegrityEngine::from_config(config(&state, &staging)).unwrap();
        let outcome = engine.sync_registered("1.20").unwrap().outcome().unwrap();
        assert_eq!(outcome.added, 2);
        assert_eq!(engine.verify_scope("1.20").unwrap().valid, 2);
        engine.public_key()
    };

    let engine = IntegrityEngine::from_config(config(&state, &staging)).unwrap();
    assert_eq!(engine.public_key(), public_key);

    let stats = engine.get_sync_stats("1.20").unwrap();
    assert_eq!(stats.total_files, 2);
    assert_eq!(stats.verified_files, 2);

    staging.write("1.20/client.jar", "PK injected");
    assert!(matches!(
        engine.authorize_download("1.20", "client.jar"),
        Err(Error::TamperDetected { .. })
    ));
}

#[test]
fn test_records_are_typed_by_path() {
    let state = ScopeFixture::new();
    let staging = ScopeFixture::new()
        .with_file("1.20/client.jar", "jar")
        .with_file("1.20/mods/sodium.jar", "jar")
        .with_file("1.20/natives/lwjgl.so", "so")
        .with_file("1.20/options.txt", "fov:70");

    let engine = IntegrityEngine::from_config(config(&state, &staging)).unwrap();
    engine.sync_registered("1.20").unwrap();
    drop(engine);

    let index = SqliteFileIndex::open(state.path("index.db")).unwrap();
    let types: Vec<(String, String)> = index
        .list_by_scope("1.20")
        .unwrap()
        .into_iter()
        .map(|r| (r.relative_path.to_string(), r.file_type.to_string()))
        .collect();
    assert_eq!(
        types,
        vec![
            ("client.jar".to_string(), "executable".to_string()),
            ("mods/sodium.jar".to_string(), "library".to_string()),
            ("natives/lwjgl.so".to_string(), "native".to_string()),
            ("options.txt".to_string(), "config".to_string()),
        ]
    );
}

#[test]
fn test_index_manifest_can_be_signed_without_disk() {
    let state = ScopeFixture::new();
    let staging = ScopeFixture::new().with_file("1.20/a.txt", "A");
    let index = Arc::new(SqliteFileIndex::open(state.path("index.db")).unwrap());

    let engine = IntegrityEngine::new(
        config(&state, &staging),
        index,
        Arc::new(warden_core::Ed25519Signer::generate()),
    )
    .unwrap();
    engine.sync_registered("1.20").unwrap();
    staging.remove("1.20/a.txt");

    let signed = engine.signed_manifest_from_index("1.20").unwrap();
    assert!(signed.verify(&engine.public_key()));
    assert!(matches!(signed.manifest.get("a.txt"), Some(HashNode::File { .. })));
}
