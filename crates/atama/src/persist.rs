//! Persistence collaborators.
//!
//! The engine loads the top-level keys of a stored snapshot once when it is
//! built and saves the whole root after every mutation that changed state.
//! The medium is opaque to the engine; two backends ship with the crate.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PersistError;
use crate::history::now_millis;

pub trait Persistence: Send {
    /// Top-level keys of the stored snapshot, if any.
    fn load(&mut self) -> Result<Option<Map<String, Value>>, PersistError>;

    fn save(&mut self, root: &Value) -> Result<(), PersistError>;
}

/// Stored form of a root: `{"timestamp": <ms>, "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: i64,
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
}

impl Snapshot {
    pub fn of(root: &Value) -> Result<Self, PersistError> {
        let data = root.as_object().cloned().ok_or(PersistError::NotObject)?;
        Ok(Self {
            timestamp: now_millis(),
            data: Some(data),
        })
    }

    pub fn encode(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a stored blob. An empty blob holds nothing.
    pub fn decode(blob: &str) -> Result<Option<Self>, PersistError> {
        if blob.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(blob)?))
    }
}

/// Keeps the encoded snapshot in memory. Clones share the same blob.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blob: Arc<Mutex<Option<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: Arc::new(Mutex::new(Some(blob.into()))),
        }
    }

    pub fn blob(&self) -> Option<String> {
        self.blob.lock().clone()
    }

    pub fn snapshot(&self) -> Result<Option<Snapshot>, PersistError> {
        match self.blob() {
            Some(blob) => Snapshot::decode(&blob),
            None => Ok(None),
        }
    }
}

impl Persistence for MemoryStore {
    fn load(&mut self) -> Result<Option<Map<String, Value>>, PersistError> {
        Ok(self.snapshot()?.and_then(|s| s.data))
    }

    fn save(&mut self, root: &Value) -> Result<(), PersistError> {
        let blob = Snapshot::of(root)?.encode()?;
        *self.blob.lock() = Some(blob);
        Ok(())
    }
}

/// Keeps the encoded snapshot in a JSON file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for FileStore {
    fn load(&mut self) -> Result<Option<Map<String, Value>>, PersistError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let blob = fs::read_to_string(&self.path)?;
        Ok(Snapshot::decode(&blob)?.and_then(|s| s.data))
    }

    fn save(&mut self, root: &Value) -> Result<(), PersistError> {
        let blob = Snapshot::of(root)?.encode()?;
        fs::write(&self.path, blob)?;
        Ok(())
    }
}
