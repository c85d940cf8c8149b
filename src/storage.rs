//! Durable key-value storage and the session store built on top of it.
//!
//! Backends hold opaque string values under string keys:
//! - `FileStorage` keeps one JSON file per key on disk
//! - `MemoryStorage` keeps values in-process, with an optional byte quota
//!
//! `SessionStore` owns the session schema and never fails outward.

use crate::sessions::{WELCOME_TITLE, create_session};
use crate::types::{ChatSession, SessionCollection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::{fs, io};

pub const DEFAULT_STORAGE_KEY: &str = "chatbot_sessions";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to read '{key}': {source}")]
    Read {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write '{key}': {source}")]
    Write {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("Storage quota exceeded writing '{key}': {needed} bytes, limit {limit}")]
    QuotaExceeded {
        key: String,
        needed: usize,
        limit: usize,
    },

    #[error("Stored sessions are malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Storage lock poisoned")]
    Poisoned,
}

/// A durable slot of string values. Writes replace the whole value.
pub trait StorageBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl<B: StorageBackend + ?Sized> StorageBackend for Arc<B> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

// ============================================
// File backend
// ============================================

#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Platform data directory, or `cache/storage` when none is known.
    pub fn default_root() -> PathBuf {
        if let Some(data_dir) = dirs::data_local_dir() {
            return data_dir.join("chatbot").join("storage");
        }

        PathBuf::from("cache").join("storage")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", sanitize_key(key)))
    }
}

impl StorageBackend for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let write_err = |source| StorageError::Write {
            key: key.to_string(),
            source,
        };

        fs::create_dir_all(&self.root).map_err(write_err)?;
        // write-then-rename so readers never observe a half-written value
        let path = self.path_for(key);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, value).map_err(write_err)?;
        fs::rename(&staging, &path).map_err(|err| {
            if let Err(cleanup) = fs::remove_file(&staging) {
                tracing::warn!(path = %staging.display(), "Failed to remove staging file: {cleanup}");
            }
            write_err(err)
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Write {
                key: key.to_string(),
                source,
            }),
        }
    }
}

/// Sanitize storage key for filesystem use
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect()
}

// ============================================
// Memory backend
// ============================================

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects any write that would push the total stored bytes past `limit`.
    pub fn with_quota(limit: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota: Some(limit),
        }
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        if let Some(limit) = self.quota {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            let needed = others + value.len();
            if needed > limit {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    limit,
                });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

// ============================================
// Session store
// ============================================

/// Reads and writes the whole session collection under a single key.
/// Last write wins; there is one writer per slot.
pub struct SessionStore<B> {
    backend: B,
    key: String,
}

impl<B: StorageBackend> SessionStore<B> {
    pub fn new(backend: B) -> Self {
        Self::with_key(backend, DEFAULT_STORAGE_KEY)
    }

    pub fn with_key(backend: B, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Stored sessions, or a single "Welcome Chat" session when the slot is
    /// missing, empty, unreadable or malformed.
    pub fn load(&self) -> SessionCollection {
        match self.read() {
            Ok(Some(sessions)) if !sessions.is_empty() => {
                tracing::debug!(key = %self.key, count = sessions.len(), "loaded chat sessions");
                return sessions;
            }
            Ok(_) => {
                tracing::debug!(key = %self.key, "no stored chat sessions, starting fresh");
            }
            Err(err) => {
                tracing::error!(key = %self.key, "Error loading chat sessions: {err}");
            }
        }

        vec![Arc::new(create_session(Some(WELCOME_TITLE)))]
    }

    /// Best effort: failures are logged and the in-memory state stays authoritative.
    pub fn save(&self, sessions: &[Arc<ChatSession>]) {
        if let Err(err) = self.write(sessions) {
            tracing::error!(key = %self.key, "Error saving chat sessions: {err}");
        }
    }

    fn read(&self) -> Result<Option<SessionCollection>, StorageError> {
        let Some(raw) = self.backend.get(&self.key)? else {
            return Ok(None);
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let sessions: SessionCollection = serde_json::from_str(&raw)?;
        Ok(Some(sessions))
    }

    fn write(&self, sessions: &[Arc<ChatSession>]) -> Result<(), StorageError> {
        let encoded = serde_json::to_string(sessions)?;
        self.backend.set(&self.key, &encoded)
    }
}
