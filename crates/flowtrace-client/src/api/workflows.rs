//! Workflows API.

use serde::Serialize;
use tracing::debug;

use flowtrace_types::WorkflowDefinition;

use super::MAX_PAGE_SIZE;
use crate::client::N8nClient;
use crate::error::Result;
use crate::types::{Page, WireWorkflow, WorkflowSummary};

#[derive(Debug, Serialize)]
struct ListQuery<'a> {
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<&'a str>,
}

/// Workflows API client.
pub struct WorkflowsApi {
    client: N8nClient,
}

impl WorkflowsApi {
    pub(crate) fn new(client: N8nClient) -> Self {
        Self { client }
    }

    /// Fetch one page of workflow summaries.
    pub async fn list_page(&self, cursor: Option<&str>) -> Result<Page<WorkflowSummary>> {
        let query = ListQuery {
            limit: MAX_PAGE_SIZE,
            cursor,
        };
        self.client.get_with_query("workflows", &query).await
    }

    /// Fetch every workflow summary, following cursors to the end.
    pub async fn list_all(&self) -> Result<Vec<WorkflowSummary>> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.list_page(cursor.as_deref()).await?;
            all.extend(page.data);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        debug!(count = all.len(), "listed workflows");
        Ok(all)
    }

    /// Get a full workflow definition by ID.
    pub async fn get(&self, id: &str) -> Result<WorkflowDefinition> {
        let wire: WireWorkflow = self.client.get(&format!("workflows/{}", id)).await?;
        Ok(wire.into_definition(id))
    }
}
