//! API endpoint implementations.

mod executions;
mod workflows;

pub use executions::{ExecutionFilter, ExecutionsApi};
pub use workflows::WorkflowsApi;

/// Largest page size the server accepts.
pub const MAX_PAGE_SIZE: usize = 250;
