//! Workflow-execution forensics.
//!
//! Reads execution records and workflow definitions after the fact and
//! explains them:
//!
//! - [`cache::NameCache`]: workflow id → name/active memo with single-flight refresh
//! - [`dataflow`]: per-node logical input/output reconstructed from `source` back-references
//! - [`code`]: rule-based script checks and error-to-line localization
//! - [`trace::ErrorTracer`]: causal explanation of a failed execution
//! - [`tree::TreeBuilder`]: recursive sub-workflow dependency tree with cycle guard
//! - [`integrity`]: structural checks and a 0–100 integrity score
//!
//! Everything that touches the network goes through [`WorkflowSource`], so
//! the engine runs the same against the live client and an in-memory double.
//! Only the fetch of a command's root target can fail; every secondary
//! problem is recorded as a [`flowtrace_types::DataIssue`] in the report.

pub mod cache;
pub mod code;
pub mod dataflow;
pub mod error;
pub mod integrity;
pub mod source;
pub mod trace;
pub mod tree;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{NameCache, WorkflowLabel};
pub use code::{CodeContext, CodeIssue, ContextLine, find_issues, locate_error_context};
pub use dataflow::{NodeDataFlow, NodeInput, NodeOutput, SourceGroup, reconstruct, resolve_node_name};
pub use error::{ForensicsError, NotFoundKind, Result};
pub use integrity::{IntegrityReport, analyze};
pub use source::WorkflowSource;
pub use trace::{ErrorTrace, ErrorTracer, TraceOptions};
pub use tree::{DependencyTreeNode, TreeBuilder, TreeOptions};
