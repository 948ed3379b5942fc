//! Secret storage backed by the OS credential store.
//!
//! Secrets are addressed by name and referenced from bento parameters via
//! the `${secret:NAME}` grammar (resolved by the engine before any other
//! substitution). The default backend is the OS keychain via `keyring`; the
//! `BENTO_SECRETS_BACKEND=env` escape hatch resolves names from process
//! environment variables instead, keeping CI runs keychain-free.

use thiserror::Error;
use tracing::debug;

static SERVICE: &str = "bento";

/// Environment variable used to select the secret resolution backend.
pub const SECRETS_BACKEND_ENV_VAR: &str = "BENTO_SECRETS_BACKEND";

/// Read access to named secrets.
///
/// Implementations must be usable from concurrent parallel branches, so the
/// trait requires `Send + Sync`.
pub trait SecretStore: Send + Sync {
    /// Resolve a secret by name. Unknown names are an error, never an empty
    /// substitution.
    fn resolve(&self, name: &str) -> Result<String, SecretError>;
}

/// Errors surfaced by secret stores.
#[derive(Debug, Error, Clone)]
pub enum SecretError {
    #[error("missing secret '{name}': {detail}")]
    Missing { name: String, detail: String },

    #[error("keychain error for '{name}': {detail}")]
    Backend { name: String, detail: String },
}

/// Secret store backed by the OS keychain.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeychainSecretStore;

impl KeychainSecretStore {
    /// Store a secret in the OS keychain.
    pub fn store(&self, name: &str, value: &str) -> Result<(), SecretError> {
        let entry = keychain_entry(name)?;
        entry.set_password(value).map_err(|e| SecretError::Backend {
            name: name.to_string(),
            detail: e.to_string(),
        })?;
        debug!("stored secret in keychain: {}", name);
        Ok(())
    }

    /// Remove a secret from the OS keychain.
    pub fn remove(&self, name: &str) -> Result<(), SecretError> {
        let entry = keychain_entry(name)?;
        entry.delete_credential().map_err(|e| SecretError::Backend {
            name: name.to_string(),
            detail: e.to_string(),
        })?;
        debug!("removed secret from keychain: {}", name);
        Ok(())
    }
}

impl SecretStore for KeychainSecretStore {
    fn resolve(&self, name: &str) -> Result<String, SecretError> {
        let entry = keychain_entry(name)?;
        entry.get_password().map_err(|e| SecretError::Missing {
            name: name.to_string(),
            detail: e.to_string(),
        })
    }
}

/// Secret store that reads process environment variables, selected via
/// `BENTO_SECRETS_BACKEND=env`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn resolve(&self, name: &str) -> Result<String, SecretError> {
        std::env::var(name).map_err(|error| SecretError::Missing {
            name: name.to_string(),
            detail: error.to_string(),
        })
    }
}

/// Build the secret store selected by `BENTO_SECRETS_BACKEND`.
pub fn default_secret_store() -> Box<dyn SecretStore> {
    let configured = std::env::var(SECRETS_BACKEND_ENV_VAR).unwrap_or_default();
    match configured.trim().to_ascii_lowercase().as_str() {
        "env" => Box::new(EnvSecretStore),
        _ => Box::new(KeychainSecretStore),
    }
}

fn keychain_entry(name: &str) -> Result<keyring::Entry, SecretError> {
    keyring::Entry::new(SERVICE, name).map_err(|e| SecretError::Backend {
        name: name.to_string(),
        detail: e.to_string(),
    })
}
