//! Per-user model override persistence.

use crate::config::ModelConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read override store: {0}")]
    Read(#[source] std::io::Error),
    #[error("failed to write override store: {0}")]
    Write(#[source] std::io::Error),
    #[error("override store is corrupt: {0}")]
    Corrupt(#[source] serde_json::Error),
}

/// Per-user model configuration overrides, keyed `platform:user`.
pub trait OverrideStore: Send + Sync {
    fn get(&self, key: &str) -> Option<ModelConfig>;
    fn set(&self, key: &str, config: ModelConfig) -> Result<(), StoreError>;
    fn clear(&self, key: &str) -> Result<(), StoreError>;
}

/// JSON file store: loaded once on open, persisted on every mutation.
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, ModelConfig>>,
}

impl JsonFileStore {
    /// Open the store at `path`, creating an empty one when the file does
    /// not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(StoreError::Corrupt)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(StoreError::Read(err)),
        };
        debug!(path = %path.display(), "opened override store");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    fn persist(&self, entries: &HashMap<String, ModelConfig>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StoreError::Write)?;
            }
        }
        let raw = serde_json::to_string_pretty(entries)
            .map_err(|err| StoreError::Write(std::io::Error::other(err)))?;
        std::fs::write(&self.path, raw).map_err(StoreError::Write)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OverrideStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<ModelConfig> {
        match self.entries.read() {
            Ok(entries) => entries.get(key).cloned(),
            Err(_) => None,
        }
    }

    fn set(&self, key: &str, config: ModelConfig) -> Result<(), StoreError> {
        let mut entries = match self.entries.write() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.insert(key.to_string(), config);
        self.persist(&entries)
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = match self.entries.write() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.remove(key);
        self.persist(&entries)
    }
}
