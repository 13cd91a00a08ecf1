//! Shared domain model for flowtrace.
//!
//! Workflow definitions and execution records are reconstructed fresh for
//! every command from the remote automation server and are never mutated
//! after construction. Everything here is plain data plus a few lookup
//! helpers; fetching lives in `flowtrace-client` and analysis lives in
//! `flowtrace-forensics`.

pub mod execution;
pub mod issue;
pub mod value;
pub mod workflow;

pub use execution::{
    ExecutionError, ExecutionMode, ExecutionRecord, ExecutionStatus, NodeError, NodeRunRecord,
    NodeRuns, RunData, RunMetadata, SourceRef,
};
pub use issue::{DataIssue, Severity};
pub use workflow::{Connection, NodeDefinition, NodeKind, SubWorkflowTarget, WorkflowDefinition};
