//! Configuration for flowtrace.
//!
//! Provides TOML-based configuration with:
//! - Connection settings for the remote automation server (`[remote]`)
//! - Cache and analysis tuning (`[cache]`, `[analysis]`)
//! - Config file layering (user config dir + project-local overrides)
//! - API key resolution (keyring → env var → key file → config file)

pub mod discovery;
pub mod error;
pub mod secrets;
pub mod types;

pub use discovery::{
    LoadedConfig, config_dir, load_config, load_config_file, load_config_with_options,
    user_config_path,
};
pub use error::{ConfigError, Result};
pub use secrets::{ResolvedSecret, SecretSource, resolve_api_key};
pub use types::*;
