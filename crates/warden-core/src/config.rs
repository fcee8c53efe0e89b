//! Engine configuration
//!
//! Loaded from a TOML or JSON file through [`warden_fs::ConfigStore`].
//! Every section is optional.
//!
//! ```toml
//! [digest]
//! chunk_size = 65536
//! parallel = true
//!
//! [filter]
//! include_only = []
//! exclude = [".DS_Store", "*.tmp"]
//!
//! [integrity]
//! critical = ["client.jar", "*/client.jar"]
//!
//! [watcher]
//! enabled = true
//! debounce_ms = 750
//!
//! [index]
//! path = "/var/lib/warden/index.db"
//!
//! [signing]
//! key_path = "/etc/warden/manifest.key"
//!
//! [scopes]
//! "1.20.4" = "/srv/staging/1.20.4"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_fs::digest::DEFAULT_CHUNK_SIZE;
use warden_fs::{ConfigStore, DigestOptions, PathFilter};

use crate::{Error, Result};

/// Digest engine tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestSection {
    pub chunk_size: usize,
    pub parallel: bool,
}

impl Default for DigestSection {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            parallel: true,
        }
    }
}

/// Which files count as critical
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegritySection {
    /// Glob patterns over scope-relative paths
    pub critical: Vec<String>,
}

impl Default for IntegritySection {
    fn default() -> Self {
        Self {
            critical: vec!["client.jar".to_string(), "*/client.jar".to_string()],
        }
    }
}

/// Change watcher settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherSection {
    pub enabled: bool,
    /// Quiet period after the last event before a sync fires
    pub debounce_ms: u64,
}

impl Default for WatcherSection {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 750,
        }
    }
}

impl WatcherSection {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSection {
    /// SQLite database file; in-memory when absent
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningSection {
    /// Hex-encoded Ed25519 secret key
    pub key_path: Option<PathBuf>,
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub digest: DigestSection,
    pub filter: PathFilter,
    pub integrity: IntegritySection,
    pub watcher: WatcherSection,
    pub index: IndexSection,
    pub signing: SigningSection,
    /// Scope id to root directory
    pub scopes: BTreeMap<String, PathBuf>,
}

impl EngineConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = ConfigStore::new().load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        ConfigStore::new().save(path, self)?;
        Ok(())
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.digest.chunk_size == 0 {
            return Err(Error::InvalidConfig {
                message: "digest.chunk_size must be greater than zero".into(),
            });
        }
        if self.watcher.debounce_ms == 0 {
            return Err(Error::InvalidConfig {
                message: "watcher.debounce_ms must be greater than zero".into(),
            });
        }
        self.filter.compile()?;
        PathFilter {
            include_only: self.integrity.critical.clone(),
            exclude: Vec::new(),
        }
        .compile()?;
        Ok(())
    }

    /// Digest options with the configured filter compiled.
    pub fn digest_options(&self) -> Result<DigestOptions> {
        Ok(DigestOptions {
            chunk_size: self.digest.chunk_size,
            parallel: self.digest.parallel,
            filter: self.filter.compile()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.watcher.debounce(), Duration::from_millis(750));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_every_section() {
        let config: EngineConfig = toml::from_str(
            r#"
            [digest]
            chunk_size = 4096
            parallel = false

            [filter]
            exclude = ["*.tmp"]

            [integrity]
            critical = ["versions/*/client.jar"]

            [watcher]
            debounce_ms = 200

            [index]
            path = "index.db"

            [scopes]
            "1.20" = "/srv/1.20"
            "#,
        )
        .unwrap();

        assert_eq!(config.digest.chunk_size, 4096);
        assert!(!config.digest.parallel);
        assert_eq!(config.filter.exclude, vec!["*.tmp"]);
        assert_eq!(config.integrity.critical, vec!["versions/*/client.jar"]);
        assert!(config.watcher.enabled);
        assert_eq!(config.index.path, Some(PathBuf::from("index.db")));
        assert_eq!(config.scopes["1.20"], PathBuf::from("/srv/1.20"));
    }

    #[test]
    fn validation_rejects_zero_values_and_bad_globs() {
        let mut config = EngineConfig::default();
        config.digest.chunk_size = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig { .. })));

        let mut config = EngineConfig::default();
        config.watcher.debounce_ms = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.filter.exclude.push("[".into());
        assert!(matches!(config.validate(), Err(Error::Fs(_))));
    }

    #[test]
    fn load_round_trips_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.toml");
        let mut config = EngineConfig::default();
        config.scopes.insert("1.20".into(), PathBuf::from("/srv/1.20"));
        config.save(&path).unwrap();

        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }
}
