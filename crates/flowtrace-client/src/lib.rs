//! HTTP client for the n8n public REST API (v1).
//!
//! Responses are converted into the `flowtrace-types` domain model at the
//! boundary, so callers never see the wire format.
//!
//! # Example
//!
//! ```no_run
//! use flowtrace_client::{N8nClient, Result};
//!
//! # async fn example() -> Result<()> {
//! let client = N8nClient::builder()
//!     .base_url("https://n8n.example.com")
//!     .api_key("secret")
//!     .build()?;
//!
//! let workflows = client.workflows().list_all().await?;
//! println!("{} workflows", workflows.len());
//!
//! let execution = client.executions().get("4821", true).await?;
//! println!("{} ran {} nodes", execution.id, execution.run_data.len());
//! # Ok(())
//! # }
//! ```
//!
//! # API Coverage
//!
//! - **Workflows**: list (paginated), get
//! - **Executions**: list with filters (paginated), get with run data, delete

pub mod api;
pub mod client;
pub mod error;
pub mod types;

pub use api::{ExecutionFilter, ExecutionsApi, WorkflowsApi};
pub use client::{ClientBuilder, N8nClient};
pub use error::{Error, Result};
pub use types::{Page, WorkflowSummary};
