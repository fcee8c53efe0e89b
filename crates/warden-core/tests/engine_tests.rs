//! Tests for the engine facade

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use warden_core::signer::verify;
use warden_core::{
    DownloadTicket, Ed25519Signer, EngineConfig, Error, IntegrityEngine, IntegrityOutcome,
    PathFilter, SyncOutcome, SyncRun,
};
use warden_index::MemoryFileIndex;
use warden_test_utils::ScopeFixture;

fn engine() -> IntegrityEngine {
    IntegrityEngine::new(
        EngineConfig::default(),
        Arc::new(MemoryFileIndex::new()),
        Arc::new(Ed25519Signer::generate()),
    )
    .unwrap()
}

fn synced(engine: &IntegrityEngine, scope: &str, root: &Path) -> SyncOutcome {
    engine
        .sync_scope(scope, root)
        .unwrap()
        .outcome()
        .expect("sync should not coalesce")
}

mod scope_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_operations_on_unknown_scope_fail() {
        let engine = engine();
        assert!(matches!(
            engine.verify_scope("nope"),
            Err(Error::UnknownScope { .. })
        ));
        assert!(matches!(
            engine.authorize_download("nope", "a.txt"),
            Err(Error::UnknownScope { .. })
        ));
        assert!(matches!(
            engine.signed_manifest("nope"),
            Err(Error::UnknownScope { .. })
        ));
    }

    #[test]
    fn test_vanished_root_is_reported() {
        let fixture = ScopeFixture::abc();
        let engine = engine();
        let root = fixture.path("scope");
        std::fs::create_dir(&root).unwrap();
        synced(&engine, "1.20", &root);
        std::fs::remove_dir(&root).unwrap();

        assert!(matches!(
            engine.verify_scope("1.20"),
            Err(Error::ScopeRootMissing { .. })
        ));
        assert!(matches!(
            engine.sync_registered("1.20"),
            Err(Error::ScopeRootMissing { .. })
        ));
    }

    #[test]
    fn test_configured_scopes_are_registered() {
        let fixture = ScopeFixture::abc();
        let mut config = EngineConfig::default();
        config.scopes.insert("1.20".into(), fixture.root().to_path_buf());
        let engine = IntegrityEngine::new(
            config,
            Arc::new(MemoryFileIndex::new()),
            Arc::new(Ed25519Signer::generate()),
        )
        .unwrap();

        let outcome = engine.sync_registered("1.20").unwrap().outcome().unwrap();
        assert_eq!(outcome.added, 3);
    }

    #[test]
    fn test_forget_scope_drops_records() {
        let fixture = ScopeFixture::abc();
        let engine = engine();
        synced(&engine, "1.20", fixture.root());

        assert_eq!(engine.forget_scope("1.20").unwrap(), 3);
        assert_eq!(engine.get_sync_stats("1.20").unwrap().total_files, 0);
        assert!(engine.scopes().root("1.20").is_err());
    }
}

mod verification_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_verify_then_stats() {
        let fixture = ScopeFixture::abc();
        let engine = engine();
        synced(&engine, "1.20", fixture.root());

        let outcome = engine.verify_scope("1.20").unwrap();
        assert_eq!(
            outcome,
            IntegrityOutcome {
                total: 3,
                valid: 3,
                invalid: 0,
                interrupted: false
            }
        );

        fixture.write("a.txt", "tampered");
        assert!(!engine.verify_one("1.20", "a.txt").unwrap());

        let stats = engine.get_sync_stats("1.20").unwrap();
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.verified_files, 2);
        assert_eq!(stats.failed_files, 1);
        assert!(stats.last_sync.is_some());
    }

    #[test]
    fn test_resync_clears_failure_flag() {
        let fixture = ScopeFixture::abc();
        let engine = engine();
        synced(&engine, "1.20", fixture.root());
        fixture.write("c.txt", "C2");
        assert!(!engine.verify_one("1.20", "c.txt").unwrap());

        assert_eq!(synced(&engine, "1.20", fixture.root()).updated, 1);
        let stats = engine.get_sync_stats("1.20").unwrap();
        assert_eq!(stats.failed_files, 0);
        assert!(engine.verify_one("1.20", "c.txt").unwrap());
    }

    #[test]
    fn test_shutdown_interrupts_bulk_verification() {
        let fixture = ScopeFixture::abc();
        let engine = engine();
        synced(&engine, "1.20", fixture.root());

        engine.shutdown();
        assert!(engine.verify_scope("1.20").unwrap().interrupted);
    }

    #[test]
    fn test_prune_is_explicit() {
        let fixture = ScopeFixture::abc();
        let engine = engine();
        synced(&engine, "1.20", fixture.root());
        fixture.remove("a.txt");

        synced(&engine, "1.20", fixture.root());
        assert_eq!(engine.get_sync_stats("1.20").unwrap().total_files, 3);

        assert_eq!(engine.prune_missing("1.20").unwrap(), 1);
        assert_eq!(engine.get_sync_stats("1.20").unwrap().total_files, 2);
    }
}

mod download_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_gate_serves_intact_and_refuses_modified() {
        let fixture = ScopeFixture::abc();
        let engine = engine();
        synced(&engine, "1.20", fixture.root());

        let ticket = engine.authorize_download("1.20", "b/b.txt").unwrap();
        assert!(matches!(ticket, DownloadTicket::Local { size: 1, .. }));

        fixture.write("b/b.txt", "bad");
        let err = engine.authorize_download("1.20", "b/b.txt").unwrap_err();
        assert!(err.is_access_denied());
    }

    #[test]
    fn test_tampered_client_jar_is_escalated() {
        let fixture = ScopeFixture::abc().with_file("client.jar", "PK original");
        let engine = engine();
        synced(&engine, "1.20", fixture.root());

        fixture.write("client.jar", "PK patched");
        let err = engine.authorize_download("1.20", "client.jar").unwrap_err();
        assert!(matches!(err, Error::TamperDetected { .. }));
        assert!(!err.is_access_denied());
    }
}

mod manifest_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_signed_manifest_verifies_with_engine_key() {
        let fixture = ScopeFixture::abc();
        let engine = engine();
        engine.register_scope("1.20", fixture.root());

        let signed = engine.signed_manifest("1.20").unwrap();
        assert!(signed.verify(&engine.public_key()));
        assert_eq!(signed.manifest.file_count(), 3);
    }

    #[test]
    fn test_index_manifest_matches_disk_manifest() {
        let fixture = ScopeFixture::abc();
        let engine = engine();
        synced(&engine, "1.20", fixture.root());

        let from_disk = engine.signed_manifest("1.20").unwrap();
        let from_index = engine.signed_manifest_from_index("1.20").unwrap();
        assert_eq!(from_disk.manifest.hash(), from_index.manifest.hash());
        assert_eq!(from_disk.signature, from_index.signature);
    }

    #[test]
    fn test_hash_directory_honours_filter() {
        let fixture = ScopeFixture::abc().with_file("b/skip.tmp", "x");
        let engine = engine();

        let all = engine.hash_directory(fixture.root(), &PathFilter::new()).unwrap();
        let filtered = engine
            .hash_directory(fixture.root(), &PathFilter::new().exclude("*.tmp"))
            .unwrap();
        assert_eq!(all.root.file_count(), 4);
        assert_eq!(filtered.root.file_count(), 3);
        assert!(filtered.root.get("b/skip.tmp").is_none());
    }

    #[test]
    fn test_raw_sign_round_trip() {
        let engine = engine();
        let signature = engine.sign(b"bytes").unwrap();
        assert!(verify(b"bytes", &signature, &engine.public_key()));
        assert!(!verify(b"bytez", &signature, &engine.public_key()));
    }
}

mod config_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_config_persists_index_and_key() {
        let state = ScopeFixture::new();
        let fixture = ScopeFixture::abc();
        let mut config = EngineConfig::default();
        config.index.path = Some(state.path("index.db"));
        config.signing.key_path = Some(state.path("manifest.key"));

        let public_key = {
            let engine = IntegrityEngine::from_config(config.clone()).unwrap();
            synced(&engine, "1.20", fixture.root());
            engine.public_key()
        };

        let engine = IntegrityEngine::from_config(config).unwrap();
        assert_eq!(engine.public_key(), public_key);
        assert_eq!(engine.get_sync_stats("1.20").unwrap().total_files, 3);
    }

    #[test]
    fn test_open_reads_config_file() {
        let state = ScopeFixture::new();
        let fixture = ScopeFixture::abc().with_file("notes.tmp", "x");
        state.write(
            "warden.toml",
            format!(
                "[filter]\nexclude = [\"*.tmp\"]\n\n[scopes]\n\"1.20\" = {:?}\n",
                fixture.root().to_string_lossy()
            ),
        );

        let engine = IntegrityEngine::open(&state.path("warden.toml")).unwrap();
        let outcome = engine.sync_registered("1.20").unwrap().outcome().unwrap();
        assert_eq!(outcome.added, 3);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = EngineConfig::default();
        config.integrity.critical.push("[".into());
        assert!(IntegrityEngine::from_config(config).is_err());
    }
}

mod watch_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn wait_for(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(50));
        }
        done()
    }

    #[test]
    fn test_disabled_watcher_returns_none() {
        let fixture = ScopeFixture::new();
        let mut config = EngineConfig::default();
        config.watcher.enabled = false;
        let engine = IntegrityEngine::new(
            config,
            Arc::new(MemoryFileIndex::new()),
            Arc::new(Ed25519Signer::generate()),
        )
        .unwrap();
        assert!(engine.watch(fixture.root()).is_none());
    }

    #[test]
    fn test_new_staging_directory_becomes_a_synced_scope() {
        let staging = ScopeFixture::new();
        let mut config = EngineConfig::default();
        config.watcher.debounce_ms = 100;
        let engine = IntegrityEngine::new(
            config,
            Arc::new(MemoryFileIndex::new()),
            Arc::new(Ed25519Signer::generate()),
        )
        .unwrap();

        let mut handle = engine.watch(staging.root()).unwrap();
        if !handle.is_active() {
            // No notification backend on this host
            return;
        }

        staging.write("1.20/a.txt", "A");
        staging.write("1.20/b/b.txt", "B");

        let synced = wait_for(Duration::from_secs(10), || {
            engine
                .get_sync_stats("1.20")
                .map(|s| s.total_files == 2)
                .unwrap_or(false)
        });
        handle.stop();
        assert!(synced, "watcher should have synced the new scope");
        assert!(matches!(
            engine.sync_registered("1.20").unwrap(),
            SyncRun::Completed(SyncOutcome {
                added: 0,
                updated: 0,
                errors: 0
            })
        ));
    }
}
