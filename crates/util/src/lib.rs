//! Durable stores backing a bento run: OS-keychain secrets, persisted user
//! variables, and lightweight preferences.
//!
//! Nothing in this crate knows about the engine; the engine consumes the
//! [`keystore::SecretStore`] trait and the CLI merges
//! [`variables::VariableStore`] contents into the run's ambient variables.

use std::path::PathBuf;

pub mod keystore;
pub mod preferences;
pub mod variables;

pub use keystore::{EnvSecretStore, KeychainSecretStore, SecretError, SecretStore};
pub use preferences::{Preferences, PreferencesError};
pub use variables::{VariableStore, VariableStoreError};

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = dirs_next::home_dir()
    {
        return home.join(stripped);
    }
    PathBuf::from(path)
}
