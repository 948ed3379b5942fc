//! Persisted user variables.
//!
//! A tiny JSON-backed key/value store (`~/.config/bento/variables.json` on
//! most platforms) whose contents seed a run's ambient variables. The file
//! is written through an internal `Mutex` so it is safe to read and write
//! from multiple threads.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dirs_next::config_dir;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::expand_tilde;

/// Environment variable allowing callers to override the variables file path.
pub const VARIABLES_PATH_ENV: &str = "BENTO_VARIABLES_PATH";

/// Default filename for the JSON payload.
pub const VARIABLES_FILE_NAME: &str = "variables.json";

/// Error surfaced when reading or writing the variable store fails.
#[derive(Debug, Error)]
pub enum VariableStoreError {
    /// I/O failure (for example, permissions or missing directory).
    #[error("variable store I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization or deserialization failure.
    #[error("variable store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Thread-safe user variable store backed by a JSON file.
#[derive(Debug, Default)]
pub struct VariableStore {
    path: PathBuf,
    payload: Mutex<BTreeMap<String, JsonValue>>,
    persist_to_disk: bool,
}

impl VariableStore {
    /// Open the store at the default (or env-overridden) path, loading any
    /// existing payload.
    pub fn open() -> Result<Self, VariableStoreError> {
        let resolved_path = default_variables_path();
        let payload = load_payload(&resolved_path)?;
        Ok(Self {
            path: resolved_path,
            payload: Mutex::new(payload),
            persist_to_disk: true,
        })
    }

    /// Build an in-memory store used as a fallback when the config directory
    /// cannot be accessed.
    pub fn ephemeral() -> Self {
        Self {
            path: PathBuf::new(),
            payload: Mutex::new(BTreeMap::new()),
            persist_to_disk: false,
        }
    }

    /// Path to the underlying JSON file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current value for `key`, if one was saved.
    pub fn get(&self, key: &str) -> Option<JsonValue> {
        self.payload.lock().expect("variable store lock poisoned").get(key).cloned()
    }

    /// All persisted variables, cloned out in key order.
    pub fn all(&self) -> BTreeMap<String, JsonValue> {
        self.payload.lock().expect("variable store lock poisoned").clone()
    }

    /// Persist a variable. `None` removes the key.
    pub fn set(&self, key: &str, value: Option<JsonValue>) -> Result<(), VariableStoreError> {
        let mut payload = self.payload.lock().expect("variable store lock poisoned");
        match value {
            Some(value) => {
                payload.insert(key.to_string(), value);
            }
            None => {
                payload.remove(key);
            }
        }
        if self.persist_to_disk {
            self.save_locked(&payload)?;
        }
        Ok(())
    }

    fn save_locked(&self, payload: &BTreeMap<String, JsonValue>) -> Result<(), VariableStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(payload)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}

fn load_payload(path: &Path) -> Result<BTreeMap<String, JsonValue>, VariableStoreError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let data = fs::read_to_string(path)?;
    if data.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    Ok(serde_json::from_str(&data)?)
}

fn default_variables_path() -> PathBuf {
    if let Ok(path) = env::var(VARIABLES_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return expand_tilde(trimmed);
        }
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bento")
        .join(VARIABLES_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_at(path: PathBuf) -> VariableStore {
        VariableStore {
            path,
            payload: Mutex::new(BTreeMap::new()),
            persist_to_disk: true,
        }
    }

    #[test]
    fn set_and_get_round_trip_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(VARIABLES_FILE_NAME);
        let store = store_at(path.clone());

        store.set("region", Some(json!("us"))).expect("persist");
        store.set("replicas", Some(json!(3))).expect("persist");

        let payload = load_payload(&path).expect("reload payload");
        assert_eq!(payload["region"], json!("us"));
        assert_eq!(payload["replicas"], json!(3));
        assert_eq!(store.get("region"), Some(json!("us")));
    }

    #[test]
    fn set_none_removes_the_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_at(dir.path().join(VARIABLES_FILE_NAME));

        store.set("stale", Some(json!("value"))).expect("persist");
        store.set("stale", None).expect("remove");
        assert_eq!(store.get("stale"), None);
    }

    #[test]
    fn ephemeral_store_never_touches_disk() {
        let store = VariableStore::ephemeral();
        store.set("k", Some(json!("v"))).expect("in-memory set");
        assert_eq!(store.get("k"), Some(json!("v")));
        assert_eq!(store.path(), Path::new(""));
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let payload = load_payload(&dir.path().join("absent.json")).expect("empty payload");
        assert!(payload.is_empty());
    }
}
