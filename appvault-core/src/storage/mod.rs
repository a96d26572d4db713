/*!
Storage adapters for sealed artifacts.

The engine reads and consumes artifacts through [`StorageAdapter`] so the
restore state machine can be exercised without touching the filesystem.
*/

pub mod local;

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::{Result, VaultError};

pub use local::LocalFileStorage;

/// Storage abstraction for saving and loading artifact data
pub trait StorageAdapter {
    /// Save data to the specified location, replacing any previous content
    fn save(&self, data: &[u8], path: &str) -> Result<()>;

    /// Load data from the specified location
    fn load(&self, path: &str) -> Result<Vec<u8>>;

    /// Check if data exists at the specified location
    fn exists(&self, path: &str) -> bool;

    /// Delete the data at the specified location; deleting nothing is not an error
    fn delete(&self, path: &str) -> Result<()>;
}

/// Write `data` to `path` through a temporary file in the same directory
/// followed by a rename, creating parent directories as needed.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| {
        VaultError::storage(format!(
            "Failed to create directory {}: {e}",
            parent.display()
        ))
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| {
        VaultError::storage(format!("Failed to replace {}: {}", path.display(), e.error))
    })?;
    Ok(())
}

/// Memory-based storage adapter for testing
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    data: std::sync::Arc<std::sync::Mutex<std::collections::HashMap<String, Vec<u8>>>>,
}

#[cfg(test)]
impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            data: std::sync::Arc::new(std::sync::Mutex::new(std::collections::HashMap::new())),
        }
    }
}

#[cfg(test)]
impl StorageAdapter for MemoryStorage {
    fn save(&self, data: &[u8], path: &str) -> Result<()> {
        let mut storage = self.data.lock().unwrap();
        storage.insert(path.to_string(), data.to_vec());
        Ok(())
    }

    fn load(&self, path: &str) -> Result<Vec<u8>> {
        let storage = self.data.lock().unwrap();
        storage
            .get(path)
            .cloned()
            .ok_or_else(|| VaultError::storage(format!("Artifact not found: {path}")))
    }

    fn exists(&self, path: &str) -> bool {
        let storage = self.data.lock().unwrap();
        storage.contains_key(path)
    }

    fn delete(&self, path: &str) -> Result<()> {
        let mut storage = self.data.lock().unwrap();
        storage.remove(path);
        Ok(())
    }
}
