//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [remote]      # server URL, credentials, timeout
//! [cache]       # workflow name/status cache
//! [analysis]    # forensics tuning
//! [logging]     # log file toggle
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g. a project-local
/// override that only sets `base_url`) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowtraceConfig {
    /// Remote server connection.
    pub remote: Option<RemoteConfig>,
    /// Name/status cache.
    pub cache: Option<CacheConfig>,
    /// Analysis tuning.
    pub analysis: Option<AnalysisConfig>,
    /// Log output.
    pub logging: Option<LoggingConfig>,
}

impl FlowtraceConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// `[remote]` merges field by field so a project file can override the
    /// URL without dropping the user's credentials. Other sections are
    /// replaced whole.
    pub fn merge(&mut self, other: FlowtraceConfig) {
        if let Some(layer) = other.remote {
            match self.remote.as_mut() {
                Some(base) => base.merge(layer),
                None => self.remote = Some(layer),
            }
        }

        if other.cache.is_some() {
            self.cache = other.cache;
        }

        if other.analysis.is_some() {
            self.analysis = other.analysis;
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// Remote section, or defaults.
    pub fn remote(&self) -> RemoteConfig {
        self.remote.clone().unwrap_or_default()
    }

    /// Cache section, or defaults.
    pub fn cache(&self) -> CacheConfig {
        self.cache.clone().unwrap_or_default()
    }

    /// Analysis section, or defaults.
    pub fn analysis(&self) -> AnalysisConfig {
        self.analysis.clone().unwrap_or_default()
    }

    /// Logging section, or defaults.
    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// `[remote]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Server root URL, e.g. `https://n8n.example.com`.
    pub base_url: Option<String>,
    /// File holding the API key. `~` expands to the home directory.
    pub api_key_file: Option<PathBuf>,
    /// Inline API key. Accepted, but warned about.
    pub api_key: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: Option<u64>,
}

impl RemoteConfig {
    fn merge(&mut self, other: RemoteConfig) {
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.api_key_file.is_some() {
            self.api_key_file = other.api_key_file;
        }
        if other.api_key.is_some() {
            self.api_key = other.api_key;
        }
        if other.timeout_secs.is_some() {
            self.timeout_secs = other.timeout_secs;
        }
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Whether an API key is written into the config in plaintext.
    pub fn has_plaintext_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long workflow names stay fresh.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Upper bound on concurrent sibling fetches in the dependency tree.
pub const MAX_TREE_CONCURRENCY: usize = 8;

/// `[analysis]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Lines of context on each side of a located error line.
    pub context_lines: usize,
    /// Maximum depth of the dependency tree.
    pub max_tree_depth: usize,
    /// Concurrent sibling fetches while building the dependency tree.
    pub tree_concurrency: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            context_lines: 5,
            max_tree_depth: 12,
            tree_concurrency: 4,
        }
    }
}

impl AnalysisConfig {
    /// Concurrency clamped to `1..=MAX_TREE_CONCURRENCY`.
    pub fn effective_concurrency(&self) -> usize {
        self.tree_concurrency.clamp(1, MAX_TREE_CONCURRENCY)
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write a JSON log file under the config directory.
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { file: true }
    }
}
