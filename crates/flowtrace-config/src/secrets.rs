//! API key resolution.
//!
//! Resolution order:
//! 1. System keyring (if `keyring` feature enabled)
//! 2. `N8N_API_KEY`, then `N8N_API_TOKEN`
//! 3. `[remote] api_key_file`
//! 4. `[remote] api_key` (plaintext, warned about at load time)
//!
//! Keyring entries are stored as service="flowtrace", user="n8n_api_key".

use std::path::{Path, PathBuf};

use crate::{ConfigError, RemoteConfig, Result};

/// Keyring service name.
#[cfg(feature = "keyring")]
const SERVICE_NAME: &str = "flowtrace";

/// Keyring user name.
#[cfg(feature = "keyring")]
const KEYRING_USER: &str = "n8n_api_key";

/// Environment variables checked, in order.
const ENV_VARS: &[&str] = &["N8N_API_KEY", "N8N_API_TOKEN"];

/// Result of API key resolution with provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    /// The secret value.
    pub value: String,
    /// Where the secret was found.
    pub source: SecretSource,
}

/// Where a secret was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// OS keyring.
    Keyring,
    /// Environment variable.
    EnvVar(String),
    /// Dedicated key file.
    KeyFile(PathBuf),
    /// Config file (plaintext).
    ConfigFile,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::Keyring => write!(f, "system keyring"),
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
            SecretSource::KeyFile(path) => write!(f, "key file {}", path.display()),
            SecretSource::ConfigFile => write!(f, "config file (plaintext)"),
        }
    }
}

/// Resolve the API key using the full resolution chain.
pub fn resolve_api_key(remote: &RemoteConfig) -> Result<ResolvedSecret> {
    resolve_with_env(remote, |var| std::env::var(var).ok())
}

fn resolve_with_env(
    remote: &RemoteConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedSecret> {
    // 1. Keyring
    if let Some(secret) = get_from_keyring() {
        return Ok(secret);
    }

    // 2. Environment variables
    for var in ENV_VARS {
        if let Some(value) = env(var)
            && !value.trim().is_empty()
        {
            return Ok(ResolvedSecret {
                value: value.trim().to_string(),
                source: SecretSource::EnvVar(var.to_string()),
            });
        }
    }

    // 3. Key file; naming one that cannot be read is an error
    if let Some(path) = &remote.api_key_file {
        let path = expand_home(path);
        let value = std::fs::read_to_string(&path).map_err(|e| ConfigError::KeyFile {
            path: path.display().to_string(),
            source: e,
        })?;
        let value = value.trim();
        if !value.is_empty() {
            return Ok(ResolvedSecret {
                value: value.to_string(),
                source: SecretSource::KeyFile(path),
            });
        }
    }

    // 4. Inline
    match remote.api_key.as_deref() {
        Some(value) if !value.is_empty() => Ok(ResolvedSecret {
            value: value.to_string(),
            source: SecretSource::ConfigFile,
        }),
        _ => Err(ConfigError::ApiKeyNotFound),
    }
}

/// Expand a leading `~/` to the home directory.
fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

// ─────────────────────────────────────────────────────────────────────────────
// Keyring implementation (feature-gated)
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "keyring")]
fn get_from_keyring() -> Option<ResolvedSecret> {
    // Tests must not depend on the local machine's keychain.
    if cfg!(test) {
        return None;
    }

    let entry = keyring::Entry::new(SERVICE_NAME, KEYRING_USER).ok()?;
    let value = entry.get_password().ok()?;
    if value.is_empty() {
        return None;
    }
    Some(ResolvedSecret {
        value,
        source: SecretSource::Keyring,
    })
}

#[cfg(not(feature = "keyring"))]
fn get_from_keyring() -> Option<ResolvedSecret> {
    None
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
