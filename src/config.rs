//! Configuration for the voice note store
//!
//! Settings are stored as JSON (by default in `~/.voicenotes/config.json`)
//! with a schema version so older files can be migrated forward.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Current config schema version
const CURRENT_VERSION: u32 = 1;

/// Name of the data directory under the user's home
const DATA_DIR_NAME: &str = ".voicenotes";

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unknown config version: {0}")]
    UnknownVersion(u32),
}

/// SQLite journal mode for the store's connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    /// Write-ahead logging: readers proceed while a write is in progress
    #[default]
    Wal,
    /// Rollback journal: simpler, but readers wait for writers
    Delete,
}

impl JournalMode {
    /// Value passed to `PRAGMA journal_mode`
    pub fn as_pragma(self) -> &'static str {
        match self {
            JournalMode::Wal => "WAL",
            JournalMode::Delete => "DELETE",
        }
    }
}

/// Store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Schema version for migrations
    pub version: u32,
    /// Database file (None for `~/.voicenotes/voice_notes.db`)
    pub database_path: Option<PathBuf>,
    /// Journal mode applied when the writer connection opens
    pub journal_mode: JournalMode,
    /// How long a connection waits on a locked database before failing
    pub busy_timeout_ms: u64,
    /// Maximum number of idle read connections kept open
    pub max_idle_readers: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            database_path: None,
            journal_mode: JournalMode::default(),
            busy_timeout_ms: 5000,
            max_idle_readers: 4,
        }
    }
}

impl StoreConfig {
    /// Config pointing at a specific database file, other settings default
    pub fn with_database_path(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// The database file this config resolves to
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| data_dir().join("voice_notes.db"))
    }

    /// Load configuration from disk, returning defaults if the file is absent
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: StoreConfig = serde_json::from_str(&contents)?;
        let original_version = config.version;
        let migrated = migrate_config(config)?;

        if migrated.version != original_version {
            tracing::info!(
                "Migrated config from version {} to {}",
                original_version,
                migrated.version
            );
            migrated.save(path)?;
        }

        Ok(migrated)
    }

    /// Save configuration to disk as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?;
            }
        }

        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::info!("Config saved to {:?}", path);
        Ok(())
    }
}

/// Get the path to the default config file (~/.voicenotes/config.json)
pub fn default_config_path() -> PathBuf {
    data_dir().join("config.json")
}

/// Get the data directory (~/.voicenotes)
pub fn data_dir() -> PathBuf {
    home_dir_or_fallback().join(DATA_DIR_NAME)
}

/// Get the home directory, falling back to /tmp if unavailable
fn home_dir_or_fallback() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        tracing::error!("Could not determine home directory, using /tmp");
        PathBuf::from("/tmp")
    })
}

/// Migrate configuration from older schema versions
fn migrate_config(mut config: StoreConfig) -> Result<StoreConfig, ConfigError> {
    while config.version < CURRENT_VERSION {
        config = apply_migration(config)?;
    }

    if config.version > CURRENT_VERSION {
        return Err(ConfigError::UnknownVersion(config.version));
    }

    Ok(config)
}

/// Apply a single migration step
fn apply_migration(config: StoreConfig) -> Result<StoreConfig, ConfigError> {
    match config.version {
        // Version 0 -> 1: files written before versioning
        0 => {
            let mut migrated = config;
            migrated.version = 1;
            Ok(migrated)
        }
        v => Err(ConfigError::UnknownVersion(v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.version, CURRENT_VERSION);
        assert_eq!(config.journal_mode, JournalMode::Wal);
        assert_eq!(config.busy_timeout_ms, 5000);
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_default_database_path() {
        let path = StoreConfig::default().resolved_database_path();
        assert!(path.to_string_lossy().contains(".voicenotes"));
        assert!(path.to_string_lossy().ends_with("voice_notes.db"));
    }

    #[test]
    fn test_journal_mode_serialisation() {
        let json = serde_json::to_string(&JournalMode::Wal).unwrap();
        assert_eq!(json, "\"wal\"");
        let mode: JournalMode = serde_json::from_str("\"delete\"").unwrap();
        assert_eq!(mode, JournalMode::Delete);
        assert_eq!(mode.as_pragma(), "DELETE");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: StoreConfig = serde_json::from_str(r#"{"busy_timeout_ms": 250}"#).unwrap();
        assert_eq!(config.busy_timeout_ms, 250);
        assert_eq!(config.journal_mode, JournalMode::Wal);
        assert_eq!(config.max_idle_readers, 4);
    }

    #[test]
    fn test_migrate_unknown_version_fails() {
        let config = StoreConfig {
            version: 99,
            ..StoreConfig::default()
        };
        assert!(matches!(
            migrate_config(config),
            Err(ConfigError::UnknownVersion(99))
        ));
    }
}
