//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration loading and resolution.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The explicitly configured key file could not be read.
    #[error("failed to read API key file '{path}': {source}")]
    KeyFile {
        path: String,
        source: std::io::Error,
    },

    /// No server URL configured anywhere.
    #[error("no server URL configured. Set [remote] base_url, N8N_BASE_URL, or pass --server")]
    MissingBaseUrl,

    /// API key not found through any resolution method.
    #[error(
        "API key not found. Set it in the keyring, via N8N_API_KEY, or with [remote] api_key_file"
    )]
    ApiKeyNotFound,
}
