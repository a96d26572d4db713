/*!
Local filesystem storage adapter implementation.
*/

use std::fs;
use std::path::{Path, PathBuf};

use super::{write_atomic, StorageAdapter};
use crate::{Result, VaultError};

/// Local filesystem storage adapter
///
/// Artifacts are written atomically and parent directories are created on
/// demand.
///
/// # Example
/// ```rust
/// use appvault_core::storage::{LocalFileStorage, StorageAdapter};
///
/// let dir = tempfile::tempdir()?;
/// let storage = LocalFileStorage::with_base_dir(dir.path());
/// storage.save(b"sealed artifact", "pending/restore.avbak")?;
/// assert!(storage.exists("pending/restore.avbak"));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    /// Optional base directory for all artifacts
    base_dir: Option<PathBuf>,
}

impl LocalFileStorage {
    /// Create a storage adapter that uses paths as-is
    pub fn new() -> Self {
        Self { base_dir: None }
    }

    /// Create a storage adapter resolving all paths against `base_dir`
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: Some(base_dir.as_ref().to_path_buf()),
        }
    }

    /// Resolve the full path for a given storage path
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        match &self.base_dir {
            Some(base) => base.join(path),
            None => PathBuf::from(path),
        }
    }
}

impl Default for LocalFileStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageAdapter for LocalFileStorage {
    fn save(&self, data: &[u8], path: &str) -> Result<()> {
        write_atomic(&self.resolve_path(path), data)
    }

    fn load(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.resolve_path(path);

        fs::read(&full_path).map_err(|e| {
            VaultError::storage(format!(
                "Failed to read artifact from {}: {}",
                full_path.display(),
                e
            ))
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve_path(path).is_file()
    }

    fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.resolve_path(path);

        if full_path.exists() {
            fs::remove_file(&full_path).map_err(|e| {
                VaultError::storage(format!(
                    "Failed to delete artifact {}: {}",
                    full_path.display(),
                    e
                ))
            })?;
        }

        Ok(())
    }
}
