//! Persisted JSON state
//!
//! Two independent documents, each read whole and written whole: the camera
//! control values and the stream configuration. Writes never fail loudly;
//! callers check the returned flag.

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use super::{OverlayPatch, StreamConfig, StreamConfigPatch};
use crate::controls::{self, CameraConfig};
use crate::error::{PtzError, Result};

/// A JSON document on disk
#[derive(Debug, Clone)]
pub struct JsonDocument {
    path: PathBuf,
}

impl JsonDocument {
    /// Document at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the document; `Ok(None)` if it does not exist
    pub fn read<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    /// Serialize and write the whole document
    pub fn write<T: Serialize>(&self, value: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PtzError::persist(format!("Failed to create {:?}: {}", parent, e))
                })?;
            }
        }

        let content = serde_json::to_string_pretty(value)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)
            .map_err(|e| PtzError::persist(format!("Failed to write {:?}: {}", tmp, e)))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| PtzError::persist(format!("Failed to replace {:?}: {}", self.path, e)))?;
        Ok(())
    }

    /// Write, logging instead of failing. Returns false on error.
    pub fn save<T: Serialize>(&self, value: &T) -> bool {
        match self.write(value) {
            Ok(()) => {
                debug!("Saved {:?}", self.path);
                true
            }
            Err(e) => {
                error!("Error saving {:?}: {}", self.path, e);
                false
            }
        }
    }
}

/// Persisted camera control values
#[derive(Debug)]
pub struct CameraConfigStore {
    doc: JsonDocument,
    current: Mutex<CameraConfig>,
}

impl CameraConfigStore {
    /// Open the store and load it, repairing invalid values
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let doc = JsonDocument::new(path);
        let current = Self::load_from(&doc);
        Self {
            doc,
            current: Mutex::new(current),
        }
    }

    /// Load the document.
    ///
    /// Known controls with values outside their descriptor are replaced with
    /// the default and the corrected document is written back. A missing or
    /// unreadable file yields the full default set.
    fn load_from(doc: &JsonDocument) -> CameraConfig {
        match doc.read::<CameraConfig>() {
            Ok(Some(mut config)) => {
                info!("Loaded camera config from {:?}", doc.path());
                let repaired = controls::repair(&mut config);
                if !repaired.is_empty() {
                    info!("Saving corrected camera config ({} repaired)", repaired.len());
                    doc.save(&config);
                }
                config
            }
            Ok(None) => {
                warn!("No camera config file found at {:?}, using defaults", doc.path());
                controls::defaults()
            }
            Err(e) => {
                error!("Error loading camera config {:?}: {}", doc.path(), e);
                controls::defaults()
            }
        }
    }

    /// Re-read the document from disk, replacing the in-memory config
    pub fn load(&self) -> CameraConfig {
        let config = Self::load_from(&self.doc);
        *self.current.lock() = config.clone();
        config
    }

    /// Current in-memory snapshot
    pub fn snapshot(&self) -> CameraConfig {
        self.current.lock().clone()
    }

    /// Current value of one control
    pub fn get(&self, name: &str) -> Option<i64> {
        self.current.lock().get(name).copied()
    }

    /// Persist `config` and make it current. Returns false on I/O failure.
    pub fn save(&self, config: CameraConfig) -> bool {
        let mut current = self.current.lock();
        *current = config;
        self.doc.save(&*current)
    }

    /// Set one value and persist
    pub fn set(&self, name: &str, value: i64) -> bool {
        let mut current = self.current.lock();
        current.insert(name.to_string(), value);
        self.doc.save(&*current)
    }

    /// Shallow-merge `partial`, persist, and return the new snapshot.
    ///
    /// Values are not validated here; repair only happens on load.
    pub fn merge_update(&self, partial: CameraConfig) -> CameraConfig {
        let mut current = self.current.lock();
        current.extend(partial);
        self.doc.save(&*current);
        current.clone()
    }
}

/// Persisted stream configuration
#[derive(Debug)]
pub struct StreamConfigStore {
    doc: JsonDocument,
    current: Mutex<StreamConfig>,
}

impl StreamConfigStore {
    /// Open the store and load it
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let doc = JsonDocument::new(path);
        let current = Self::load_from(&doc);
        Self {
            doc,
            current: Mutex::new(current),
        }
    }

    fn load_from(doc: &JsonDocument) -> StreamConfig {
        match doc.read::<StreamConfig>() {
            Ok(Some(config)) => {
                info!("Loaded stream config from {:?}", doc.path());
                config
            }
            Ok(None) => {
                debug!("No stream config file found at {:?}, using defaults", doc.path());
                StreamConfig::default()
            }
            Err(e) => {
                error!("Error loading stream config {:?}: {}", doc.path(), e);
                StreamConfig::default()
            }
        }
    }

    /// Re-read the document from disk, replacing the in-memory config
    pub fn load(&self) -> StreamConfig {
        let config = Self::load_from(&self.doc);
        *self.current.lock() = config.clone();
        config
    }

    /// Current in-memory snapshot
    pub fn snapshot(&self) -> StreamConfig {
        self.current.lock().clone()
    }

    /// Persist `config` and make it current. Returns false on I/O failure.
    pub fn save(&self, config: StreamConfig) -> bool {
        let mut current = self.current.lock();
        *current = config;
        self.doc.save(&*current)
    }

    /// Shallow-merge `patch`, persist, and return the new snapshot
    pub fn merge_update(&self, patch: StreamConfigPatch) -> StreamConfig {
        let mut current = self.current.lock();
        current.merge(patch);
        self.doc.save(&*current);
        current.clone()
    }

    /// Merge an overlay-only patch, persist, and return the new snapshot
    pub fn merge_overlay(&self, patch: OverlayPatch) -> StreamConfig {
        self.merge_update(StreamConfigPatch {
            overlay: Some(patch),
            ..Default::default()
        })
    }

    /// Set the auto-start flag and persist
    pub fn set_auto_start(&self, auto_start: bool) -> bool {
        let mut current = self.current.lock();
        current.auto_start = auto_start;
        self.doc.save(&*current)
    }
}
