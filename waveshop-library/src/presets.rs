//! Named export presets and the key-value stores they persist to
//!
//! The whole preset list is one JSON object stored under a single key.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::export::ExportConfig;

/// Store key holding the serialized preset list
pub const PRESETS_KEY: &str = "export_presets";

/// Errors that can occur while loading or saving presets
#[derive(Error, Debug)]
pub enum PresetError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed preset data: {0}")]
    Malformed(String),
}

/// Minimal string key-value persistence
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, PresetError>;
    fn set(&mut self, key: &str, value: String) -> Result<(), PresetError>;
}

/// Store kept in memory, for tests and ephemeral sessions
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PresetError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), PresetError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under the user config directory
    pub fn default_location() -> Self {
        Self::new(Self::default_dir())
    }

    pub fn default_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("waveshop")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, PresetError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(PresetError::Malformed(format!("invalid store key {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, PresetError> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), PresetError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(&path, value)?;
        debug!(path = %path.display(), "store entry written");
        Ok(())
    }
}

/// Preset name to export configuration, ordered by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresetList {
    presets: BTreeMap<String, ExportConfig>,
}

impl PresetList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a preset, returning the previous config for that name
    ///
    /// The config is stored as given; it is checked when it is exported.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        config: ExportConfig,
    ) -> Result<Option<ExportConfig>, PresetError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PresetError::Malformed("preset name is empty".into()));
        }
        Ok(self.presets.insert(name, config))
    }

    /// Silent no-op when absent
    pub fn remove(&mut self, name: &str) -> Option<ExportConfig> {
        self.presets.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&ExportConfig> {
        self.presets.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    /// Read the list from `store`; a missing key yields an empty list
    pub fn load(store: &dyn KeyValueStore) -> Result<Self, PresetError> {
        let Some(raw) = store.get(PRESETS_KEY)? else {
            return Ok(Self::default());
        };
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, store: &mut dyn KeyValueStore) -> Result<(), PresetError> {
        let json = serde_json::to_string_pretty(self)?;
        store.set(PRESETS_KEY, json)
    }
}
