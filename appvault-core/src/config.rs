//! Engine configuration
//!
//! Well-known locations (artifact, backups, account registry) and the
//! capture limits applied during extraction.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{Result, VaultError};

/// Rows sampled per table
pub const DEFAULT_ROW_CAP: usize = 100;
/// Directory levels descended below the files root
pub const DEFAULT_MAX_DEPTH: usize = 3;
/// Files at or above this size are not read
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

pub const DEFAULT_ARTIFACT_NAME: &str = "restore.avbak";
pub const DEFAULT_REGISTRY_NAME: &str = "counter.json";

/// Pre-shared key embedded in the engine. Sealed artifacts are only portable
/// between engines configured with the same key.
pub const DEFAULT_ENVELOPE_KEY: &str = "AppVaultBackup2024";

/// Configuration for a [`VaultEngine`](crate::VaultEngine)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding the pending artifact and the account registry
    pub state_dir: PathBuf,
    /// File name of the sealed artifact inside `state_dir`
    pub artifact_name: String,
    /// Directory receiving timestamped backup documents
    pub backup_dir: PathBuf,
    /// File name of the account registry inside `state_dir`
    pub registry_name: String,
    pub row_cap: usize,
    pub max_depth: usize,
    pub max_file_size: u64,
    pub envelope_key: String,
}

impl EngineConfig {
    /// Configuration rooted at `state_dir`, with backups in `state_dir/backups`
    pub fn with_state_dir<P: AsRef<Path>>(state_dir: P) -> Self {
        let state_dir = state_dir.as_ref().to_path_buf();
        Self {
            backup_dir: state_dir.join("backups"),
            state_dir,
            ..Self::default()
        }
    }

    /// Load a JSON configuration file; missing fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read(path.as_ref()).map_err(|e| {
            VaultError::storage(format!(
                "Failed to read config {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let config: Self = serde_json::from_slice(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_backup_dir<P: AsRef<Path>>(mut self, backup_dir: P) -> Self {
        self.backup_dir = backup_dir.as_ref().to_path_buf();
        self
    }

    pub fn with_row_cap(mut self, row_cap: usize) -> Self {
        self.row_cap = row_cap;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    pub fn with_envelope_key<S: Into<String>>(mut self, key: S) -> Self {
        self.envelope_key = key.into();
        self
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.state_dir.join(&self.artifact_name)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.state_dir.join(&self.registry_name)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.row_cap == 0 {
            return Err(VaultError::validation("row_cap must be greater than zero"));
        }
        if self.max_file_size == 0 {
            return Err(VaultError::validation(
                "max_file_size must be greater than zero",
            ));
        }
        if self.envelope_key.is_empty() {
            return Err(VaultError::validation("envelope_key cannot be empty"));
        }
        for (field, name) in [
            ("artifact_name", &self.artifact_name),
            ("registry_name", &self.registry_name),
        ] {
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(VaultError::validation(format!(
                    "{field} must be a plain file name, got {name:?}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("./appvault"),
            artifact_name: DEFAULT_ARTIFACT_NAME.to_string(),
            backup_dir: PathBuf::from("./appvault/backups"),
            registry_name: DEFAULT_REGISTRY_NAME.to_string(),
            row_cap: DEFAULT_ROW_CAP,
            max_depth: DEFAULT_MAX_DEPTH,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            envelope_key: DEFAULT_ENVELOPE_KEY.to_string(),
        }
    }
}
