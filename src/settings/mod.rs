//! In-memory configuration mirrored to a [`SettingsStore`].
//!
//! Every mutation goes through [`Settings::update`], which merges and then
//! persists in the same call. Persistence failures are logged and never undo
//! the in-memory value.

pub mod store;

pub use store::{JsonFileStore, SettingsError, SettingsMap, SettingsStore};

use serde_json::Value;
use std::path::{Path, PathBuf};

/// Key holding the absolute path of the last opened repository.
pub const REPOSITORY_KEY: &str = "repository";

/// Key-value configuration backed by durable storage.
pub struct Settings {
    values: SettingsMap,
    store: Box<dyn SettingsStore>,
}

impl Settings {
    /// Load from `store`, falling back to an empty map on any failure.
    pub fn load(store: Box<dyn SettingsStore>) -> Self {
        let values = match store.load() {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!("Failed to load settings, starting empty: {}", e);
                SettingsMap::new()
            }
        };

        Self { values, store }
    }

    pub fn values(&self) -> &SettingsMap {
        &self.values
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// The persisted repository path, if one is recorded.
    pub fn repository(&self) -> Option<PathBuf> {
        self.values
            .get(REPOSITORY_KEY)
            .and_then(Value::as_str)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
    }

    /// Shallow-merge `partial` into the current values, then save once.
    ///
    /// Returns whether the save succeeded. The merged values are kept either
    /// way.
    pub fn update(&mut self, partial: SettingsMap) -> bool {
        for (key, value) in partial {
            self.values.insert(key, value);
        }

        match self.store.save(&self.values) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to save settings: {}", e);
                false
            }
        }
    }

    pub fn set(&mut self, key: &str, value: Value) -> bool {
        let mut partial = SettingsMap::new();
        partial.insert(key.to_string(), value);
        self.update(partial)
    }

    pub fn set_repository(&mut self, path: &Path) -> bool {
        self.set(
            REPOSITORY_KEY,
            Value::String(path.to_string_lossy().into_owned()),
        )
    }
}
