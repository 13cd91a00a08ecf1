//! Where workflow definitions and execution records come from.

use async_trait::async_trait;

use flowtrace_client::{N8nClient, Result, WorkflowSummary};
use flowtrace_types::{ExecutionRecord, WorkflowDefinition};

/// Read-only access to the remote automation server.
///
/// The engine depends on this rather than on the HTTP client so analyses can
/// run against fixtures.
#[async_trait]
pub trait WorkflowSource: Send + Sync {
    /// Every workflow's id, name, and active flag.
    async fn list_workflows(&self) -> Result<Vec<WorkflowSummary>>;

    /// One full workflow definition.
    async fn get_workflow(&self, id: &str) -> Result<WorkflowDefinition>;

    /// One execution, including its run data.
    async fn get_execution(&self, id: &str) -> Result<ExecutionRecord>;
}

#[async_trait]
impl WorkflowSource for N8nClient {
    async fn list_workflows(&self) -> Result<Vec<WorkflowSummary>> {
        self.workflows().list_all().await
    }

    async fn get_workflow(&self, id: &str) -> Result<WorkflowDefinition> {
        self.workflows().get(id).await
    }

    async fn get_execution(&self, id: &str) -> Result<ExecutionRecord> {
        self.executions().get(id, true).await
    }
}
