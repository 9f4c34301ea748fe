// src/core/cache.rs

use crate::constants::{CACHE_ENTRY_EXTENSION, CACHE_KEY_PREFIX};
use crate::core::paths::{self, PathError};
use crate::models::{CacheEntry, CacheKeyMode};
use log::{debug, warn};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::UNIX_EPOCH;
use tempfile::NamedTempFile;
use thiserror::Error;

const HASH_TRUNCATE_LENGTH: usize = 16; // 16 bytes = 32 hex characters

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Cache directory unavailable: {0}")]
    Path(#[from] PathError),
    #[error("Could not persist cache entry: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("Cache task failed: {0}")]
    Task(String),
}

/// A string-keyed store for serialized payloads.
///
/// Implementations must tolerate concurrent use from several processes:
/// readers see either the old or the new payload, never a partial one.
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn set(&self, key: &str, payload: &str) -> Result<(), CacheError>;
    fn remove(&self, key: &str) -> Result<(), CacheError>;
}

// --- Persistent store ---

/// Stores one JSON [`CacheEntry`] per key in a directory. File names are a
/// truncated blake3 hash of the key, so arbitrary paths can be used as keys.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens (and creates, if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Opens the store in the user's cache directory.
    pub fn open_default() -> Result<Self, CacheError> {
        Self::open(paths::get_cache_dir()?)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The file that holds (or would hold) the entry for `key`.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", entry_file_stem(key), CACHE_ENTRY_EXTENSION))
    }

    /// Deletes every entry in the store. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(CACHE_ENTRY_EXTENSION) {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn entry_file_stem(key: &str) -> String {
    let hash = blake3::hash(key.as_bytes());
    let truncated: Vec<u8> = hash
        .as_bytes()
        .iter()
        .take(HASH_TRUNCATE_LENGTH)
        .copied()
        .collect();
    hex::encode(truncated)
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let path = self.entry_path(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: CacheEntry = serde_json::from_str(&content)?;
        if entry.key != key {
            // Two keys sharing a truncated hash; treat as a miss.
            debug!("Cache file '{}' belongs to another key", path.display());
            return Ok(None);
        }
        Ok(Some(entry.payload))
    }

    fn set(&self, key: &str, payload: &str) -> Result<(), CacheError> {
        let entry = CacheEntry {
            key: key.to_string(),
            payload: payload.to_string(),
        };
        let bytes = serde_json::to_vec(&entry)?;

        // Write next to the target and rename over it, so concurrent readers
        // never see a half-written file.
        let mut temp = NamedTempFile::new_in(&self.dir)?;
        temp.write_all(&bytes)?;
        temp.flush()?;
        temp.persist(self.entry_path(key))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// --- In-memory store ---

/// A process-local store, used where persistence is not wanted (tests, dry runs).
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, payload: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), payload.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

// --- Freshness cache ---

/// Name lists keyed by script identity and freshness.
///
/// With [`CacheKeyMode::Modified`] the key carries the script's modification
/// time, so editing the script makes old entries unreachable without any
/// explicit invalidation. Entries are immutable snapshots: writing the same
/// key twice stores the same list, so no locking is needed.
#[derive(Debug, Clone)]
pub struct FreshnessCache {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl FreshnessCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_prefix(store, CACHE_KEY_PREFIX)
    }

    pub fn with_prefix(store: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Derives the cache key for a canonical script path.
    ///
    /// # Errors
    /// Returns an I/O error if the file's metadata cannot be read (only in
    /// [`CacheKeyMode::Modified`]).
    pub async fn compute_key(&self, path: &Path, mode: CacheKeyMode) -> Result<String, CacheError> {
        match mode {
            CacheKeyMode::Fixed => Ok(format!("{}-{}", self.prefix, path.display())),
            CacheKeyMode::Modified => {
                let modified = tokio::fs::metadata(path).await?.modified()?;
                let millis = modified
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis())
                    .unwrap_or(0);
                Ok(format!("{}-{}-{}", self.prefix, path.display(), millis))
            }
        }
    }

    /// Returns the cached names for `key`. Unreadable or corrupt entries are
    /// logged and reported as a miss.
    pub async fn get(&self, key: &str) -> Option<Vec<String>> {
        let raw = match self.run_blocking(key, |store, key| store.get(key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("Cache miss for '{}'", key);
                return None;
            }
            Err(e) => {
                warn!("Ignoring cache entry for '{}': {}", key, e);
                return None;
            }
        };

        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(names) => {
                debug!("Cache hit for '{}' ({} names)", key, names.len());
                Some(names)
            }
            Err(e) => {
                warn!("Ignoring unreadable cache payload for '{}': {}", key, e);
                None
            }
        }
    }

    /// Stores `names` under `key`, replacing any previous payload.
    pub async fn set(&self, key: &str, names: &[String]) -> Result<(), CacheError> {
        let payload = serde_json::to_string(names)?;
        self.run_blocking(key, move |store, key| store.set(key, &payload))
            .await
    }

    pub async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.run_blocking(key, |store, key| store.remove(key)).await
    }

    /// Store implementations do blocking I/O; keep it off the async workers.
    async fn run_blocking<T, F>(&self, key: &str, op: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn KeyValueStore, &str) -> Result<T, CacheError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let key = key.to_string();
        tokio::task::spawn_blocking(move || op(store.as_ref(), &key))
            .await
            .map_err(|e| CacheError::Task(e.to_string()))?
    }
}
