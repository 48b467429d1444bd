//! Durable storage for the settings map.

use fs_err as fs;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type SettingsMap = Map<String, Value>;

/// Errors from loading or saving settings. Always recovered by the caller.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("settings I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("settings file does not contain a JSON object")]
    NotAnObject,
}

/// Where the settings map lives between runs.
pub trait SettingsStore: Send + Sync {
    /// Read the stored map. A store with nothing saved yet returns an empty map.
    fn load(&self) -> Result<SettingsMap, SettingsError>;

    fn save(&self, settings: &SettingsMap) -> Result<(), SettingsError>;
}

/// A single pretty-printed JSON object on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileStore {
    fn load(&self) -> Result<SettingsMap, SettingsError> {
        if !self.path.exists() {
            return Ok(SettingsMap::new());
        }

        let contents = fs::read_to_string(&self.path)?;
        match serde_json::from_str(&contents)? {
            Value::Object(map) => Ok(map),
            _ => Err(SettingsError::NotAnObject),
        }
    }

    fn save(&self, settings: &SettingsMap) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let contents = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_loads_empty() {
        let temp = tempdir().unwrap();
        let store = JsonFileStore::new(temp.path().join("config.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load_preserves_unknown_keys() {
        let temp = tempdir().unwrap();
        let store = JsonFileStore::new(temp.path().join("nested").join("config.json"));
        let settings = json!({ "repository": "/x", "theme": { "dark": true } });

        store.save(settings.as_object().unwrap()).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(Value::Object(loaded), settings);
    }

    #[test]
    fn test_saved_file_is_pretty_json() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.json");
        let store = JsonFileStore::new(&path);

        store
            .save(json!({ "repository": "/x" }).as_object().unwrap())
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "{\n  \"repository\": \"/x\"\n}");
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    #[test]
    fn test_non_object_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, SettingsError::NotAnObject));
    }
}
