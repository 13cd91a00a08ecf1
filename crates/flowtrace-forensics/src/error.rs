//! Error taxonomy for forensics commands.
//!
//! Only the fetch of a command's root target produces one of these. Missing
//! data further down is recorded as [`flowtrace_types::DataIssue`] instead.

use thiserror::Error;

/// Result type for forensics operations.
pub type Result<T> = std::result::Result<T, ForensicsError>;

/// What kind of thing was not found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotFoundKind {
    Workflow,
    Execution,
    Node,
    Run,
}

impl std::fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            NotFoundKind::Workflow => "workflow",
            NotFoundKind::Execution => "execution",
            NotFoundKind::Node => "node",
            NotFoundKind::Run => "run",
        })
    }
}

/// Errors surfaced by forensics operations.
#[derive(Debug, Error)]
pub enum ForensicsError {
    /// The server could not be reached, rejected the credentials, or
    /// answered with something unusable.
    #[error("cannot reach server: {0}")]
    Connectivity(String),

    /// The endpoint is not provisioned on this server.
    #[error("endpoint '{endpoint}' is not available on this server")]
    MissingCapability {
        endpoint: String,
        remediation: Vec<String>,
    },

    /// The requested workflow, execution, node, or run does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound {
        kind: NotFoundKind,
        id: String,
        /// Alternatives, when they can be enumerated.
        available: Vec<String>,
    },
}

impl ForensicsError {
    /// Classify a client error raised while fetching `id`.
    pub fn from_client(err: flowtrace_client::Error, kind: NotFoundKind, id: &str) -> Self {
        use flowtrace_client::Error as ClientError;

        match err {
            ClientError::NotFound(_) | ClientError::Api { status: 404, .. } => ForensicsError::NotFound {
                kind,
                id: id.to_string(),
                available: Vec::new(),
            },
            ClientError::MissingCapability(endpoint) => ForensicsError::MissingCapability {
                endpoint,
                remediation: default_remediation(),
            },
            other => ForensicsError::Connectivity(other.to_string()),
        }
    }

    /// Node lookup failure with the names that do exist.
    pub fn node_not_found(name: &str, available: Vec<String>) -> Self {
        ForensicsError::NotFound {
            kind: NotFoundKind::Node,
            id: name.to_string(),
            available,
        }
    }
}

/// Steps that usually get the public API working.
fn default_remediation() -> Vec<String> {
    vec![
        "Enable the public API on the server (Settings > n8n API).".to_string(),
        "Create an API key and export it as N8N_API_KEY.".to_string(),
        "Point base_url at the server root; /api/v1 is appended automatically.".to_string(),
    ]
}
