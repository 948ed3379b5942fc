//! User preference persistence.
//!
//! A JSON-backed store recording lightweight configuration, currently the
//! default directory searched for bento documents. Written to the standard
//! configuration directory (`~/.config/bento/preferences.json` on most
//! platforms).

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dirs_next::config_dir;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::expand_tilde;

/// Environment variable allowing callers to override the preferences file path.
pub const PREFERENCES_PATH_ENV: &str = "BENTO_PREFERENCES_PATH";

/// Default filename for the JSON payload.
pub const PREFERENCES_FILE_NAME: &str = "preferences.json";

/// Error surfaced when reading or writing preferences fails.
#[derive(Debug, Error)]
pub enum PreferencesError {
    /// I/O failure (for example, permissions or missing directory).
    #[error("preferences I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization or deserialization failure.
    #[error("preferences serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persisted preference values.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PreferencesPayload {
    /// Directory searched for bento documents when a bare name is given.
    pub bento_dir: Option<String>,
}

/// Thread-safe preferences store backed by a JSON file.
#[derive(Debug, Default)]
pub struct Preferences {
    path: PathBuf,
    payload: Mutex<PreferencesPayload>,
    persist_to_disk: bool,
}

impl Preferences {
    /// Open the store at the default (or env-overridden) path.
    pub fn open() -> Result<Self, PreferencesError> {
        let resolved_path = default_preferences_path();
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
            payload: Mutex::new(PreferencesPayload::default()),
            persist_to_disk: false,
        }
    }

    /// Path to the underlying JSON file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory searched for bento documents, expanded for `~`.
    pub fn bento_dir(&self) -> Option<PathBuf> {
        self.payload
            .lock()
            .expect("preferences lock poisoned")
            .bento_dir
            .as_deref()
            .map(expand_tilde)
    }

    /// Persist a new default bento directory.
    pub fn set_bento_dir(&self, dir: Option<String>) -> Result<(), PreferencesError> {
        let mut payload = self.payload.lock().expect("preferences lock poisoned");
        payload.bento_dir = dir;
        if self.persist_to_disk {
            self.save_locked(&payload)?;
        }
        Ok(())
    }

    fn save_locked(&self, payload: &PreferencesPayload) -> Result<(), PreferencesError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(payload)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}

fn load_payload(path: &Path) -> Result<PreferencesPayload, PreferencesError> {
    if !path.exists() {
        return Ok(PreferencesPayload::default());
    }
    let data = fs::read_to_string(path)?;
    if data.trim().is_empty() {
        return Ok(PreferencesPayload::default());
    }
    Ok(serde_json::from_str(&data)?)
}

fn default_preferences_path() -> PathBuf {
    if let Ok(path) = env::var(PREFERENCES_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return expand_tilde(trimmed);
        }
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bento")
        .join(PREFERENCES_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_at(path: PathBuf) -> Preferences {
        Preferences {
            path,
            payload: Mutex::new(PreferencesPayload::default()),
            persist_to_disk: true,
        }
    }

    #[test]
    fn bento_dir_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(PREFERENCES_FILE_NAME);
        let store = store_at(path.clone());

        store.set_bento_dir(Some("/srv/bentos".into())).expect("persist");
        let reloaded = load_payload(&path).expect("reload");
        assert_eq!(reloaded.bento_dir.as_deref(), Some("/srv/bentos"));
    }

    #[test]
    fn bento_dir_expands_tilde() {
        let store = Preferences::ephemeral();
        store.set_bento_dir(Some("/tmp/bentos".into())).expect("set");
        assert_eq!(store.bento_dir(), Some(PathBuf::from("/tmp/bentos")));
    }
}
