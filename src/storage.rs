//! Persistence adapter
//!
//! The engine keeps its state in four named slots of a byte-oriented
//! key-value store. Payloads are JSON; a slot that fails to decode is
//! treated as absent by the caller.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Logical storage slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    Logs,
    Settings,
    Threads,
    User,
}

impl StorageKey {
    pub const ALL: [StorageKey; 4] = [
        StorageKey::Logs,
        StorageKey::Settings,
        StorageKey::Threads,
        StorageKey::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::Logs => "threads_logs",
            StorageKey::Settings => "threads_settings",
            StorageKey::Threads => "threads_threads",
            StorageKey::User => "threads_user",
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Byte-oriented key-value store supplied by the host
pub trait KeyValueStore: Send + Sync {
    fn load(&self, key: StorageKey) -> Result<Option<Vec<u8>>, StorageError>;

    fn save(&self, key: StorageKey, bytes: &[u8]) -> Result<(), StorageError>;

    fn remove(&self, key: StorageKey) -> Result<(), StorageError>;

    fn clear_all(&self) -> Result<(), StorageError>;
}

/// Encode a value for a storage slot
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(value)
}

/// Decode a storage slot payload
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<StorageKey, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: StorageKey) -> Result<Option<Vec<u8>>, StorageError> {
        let slots = self.slots.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(slots.get(&key).cloned())
    }

    fn save(&self, key: StorageKey, bytes: &[u8]) -> Result<(), StorageError> {
        let mut slots = self.slots.lock().map_err(|_| StorageError::Poisoned)?;
        slots.insert(key, bytes.to_vec());
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
        let mut slots = self.slots.lock().map_err(|_| StorageError::Poisoned)?;
        slots.remove(&key);
        Ok(())
    }

    fn clear_all(&self) -> Result<(), StorageError> {
        let mut slots = self.slots.lock().map_err(|_| StorageError::Poisoned)?;
        slots.clear();
        Ok(())
    }
}

/// One `<key>.json` file per slot inside a directory
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Open (and create if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StorageError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: StorageKey) -> PathBuf {
        self.root.join(format!("{}.json", key.as_str()))
    }
}

impl KeyValueStore for DirStore {
    fn load(&self, key: StorageKey) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    fn save(&self, key: StorageKey, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key);
        // Slot is replaced atomically via rename
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes).map_err(|source| StorageError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StorageError::Io { path, source })
    }

    fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    fn clear_all(&self) -> Result<(), StorageError> {
        for key in StorageKey::ALL {
            self.remove(key)?;
        }
        Ok(())
    }
}
