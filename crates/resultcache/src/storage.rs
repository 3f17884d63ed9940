//! Cache storage backends

use std::{
    collections::hash_map::DefaultHasher,
    collections::HashMap,
    fs,
    hash::{Hash, Hasher},
    io::Write,
    path::{Path, PathBuf},
    sync::RwLock,
};

use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{CacheError, Result};
use crate::identifier::CacheKey;

/// Storage backend for cache entries, keyed by [`CacheKey`].
///
/// Entries are written once and never mutated; backends provide no eviction.
pub trait StorageBackend: Send + Sync {
    /// Retrieve a stored value
    ///
    /// # Errors
    ///
    /// Durable backends return `StorageRead` for an entry that exists but
    /// cannot be read back; callers are expected to treat that as a miss.
    fn get(&self, key: &CacheKey) -> Result<Option<Value>>;

    /// Store a value
    fn put(&self, key: &CacheKey, value: &Value) -> Result<()>;

    /// Check whether an entry exists
    fn contains(&self, key: &CacheKey) -> Result<bool>;
}

/// In-memory backend; entries live for the process lifetime
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &CacheKey) -> Result<Option<Value>> {
        // A poisoned lock means a writer panicked mid-insert; the map itself
        // is still a valid mapping, so keep serving it.
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(entries.get(&key.to_string()).cloned())
    }

    fn put(&self, key: &CacheKey, value: &Value) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn contains(&self, key: &CacheKey) -> Result<bool> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(entries.contains_key(&key.to_string()))
    }
}

/// Durable backend rooted at a cache home directory.
///
/// Each entry persists as one JSON file at `<root>/<identifier>/<call_key>.json`,
/// so entries for different functions never collide and can be inspected or
/// deleted per function. Writes go to a sibling temporary file first and are
/// committed by rename, so a partial write is never observable as an entry.
#[derive(Debug, Clone)]
pub struct DiskBackend {
    root: PathBuf,
}

impl DiskBackend {
    /// Create a backend rooted at the given directory.
    ///
    /// The directory is created lazily on the first write, so constructing a
    /// backend never touches the filesystem.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Physical location of an entry
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let file = if key.call_key().is_empty() {
            "result".to_string()
        } else {
            sanitize_file_name(key.call_key().as_str())
        };
        self.root
            .join(key.identifier().as_str())
            .join(format!("{file}.json"))
    }
}

/// Replace filesystem-hostile characters in a call key. When anything was
/// replaced, a hash of the original is appended so that distinct call keys
/// cannot collapse onto the same file.
fn sanitize_file_name(call_key: &str) -> String {
    let safe = call_key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
    if safe == call_key {
        return safe;
    }
    let mut hasher = DefaultHasher::new();
    call_key.hash(&mut hasher);
    format!("{safe}-{:08x}", hasher.finish() as u32)
}

impl StorageBackend for DiskBackend {
    fn get(&self, key: &CacheKey) -> Result<Option<Value>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .map_err(|e| CacheError::storage_read(path.clone(), e.to_string()))?;
        let value: Value = serde_json::from_str(&content)
            .map_err(|e| CacheError::storage_read(path.clone(), e.to_string()))?;
        Ok(Some(value))
    }

    fn put(&self, key: &CacheKey, value: &Value) -> Result<()> {
        let path = self.entry_path(key);
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir).map_err(|e| CacheError::storage_write(dir.to_path_buf(), e))?;

        let content = serde_json::to_string(value)?;

        // Stage in a uniquely named temp file and commit via rename: readers
        // see the old entry or the new one, never a half-written file, and
        // concurrent writers to the same key cannot share a staging file.
        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|e| CacheError::storage_write(dir.to_path_buf(), e))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| CacheError::storage_write(tmp.path().to_path_buf(), e))?;
        tmp.persist(&path)
            .map_err(|e| CacheError::storage_write(path.clone(), e.error))?;

        debug!(key = %key, path = %path.display(), "stored cache entry");
        Ok(())
    }

    fn contains(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.entry_path(key).exists())
    }
}
