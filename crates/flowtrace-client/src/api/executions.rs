//! Executions API.

use serde::Serialize;
use tracing::debug;

use flowtrace_types::{ExecutionRecord, ExecutionStatus};

use super::MAX_PAGE_SIZE;
use crate::client::N8nClient;
use crate::error::Result;
use crate::types::{Page, WireExecution};

/// Filters for listing executions.
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    /// Only executions of this workflow.
    pub workflow_id: Option<String>,
    /// Only executions in this state.
    pub status: Option<ExecutionStatus>,
    /// Ask the server to embed run data (expensive).
    pub include_data: bool,
    /// Stop after this many executions in total.
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    workflow_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'static str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    include_data: bool,
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GetQuery {
    include_data: bool,
}

/// Executions API client.
pub struct ExecutionsApi {
    client: N8nClient,
}

impl ExecutionsApi {
    pub(crate) fn new(client: N8nClient) -> Self {
        Self { client }
    }

    /// Fetch one page of executions.
    pub async fn list_page(
        &self,
        filter: &ExecutionFilter,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<Page<ExecutionRecord>> {
        let query = ListQuery {
            workflow_id: filter.workflow_id.as_deref(),
            status: filter.status.map(|s| s.as_str()),
            include_data: filter.include_data,
            limit: page_size.clamp(1, MAX_PAGE_SIZE),
            cursor,
        };
        let page: Page<WireExecution> = self.client.get_with_query("executions", &query).await?;
        Ok(Page {
            data: page.data.into_iter().map(ExecutionRecord::from).collect(),
            next_cursor: page.next_cursor,
        })
    }

    /// Fetch executions matching `filter`, following cursors until the
    /// filter's limit is reached or the list is exhausted.
    pub async fn list_all(&self, filter: &ExecutionFilter) -> Result<Vec<ExecutionRecord>> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let remaining = filter
                .limit
                .map(|limit| limit.saturating_sub(all.len()))
                .unwrap_or(MAX_PAGE_SIZE);
            if remaining == 0 {
                break;
            }

            let page = self
                .list_page(filter, cursor.as_deref(), remaining.min(MAX_PAGE_SIZE))
                .await?;
            all.extend(page.data);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        if let Some(limit) = filter.limit {
            all.truncate(limit);
        }
        debug!(count = all.len(), "listed executions");
        Ok(all)
    }

    /// Get one execution, optionally with its full run data.
    pub async fn get(&self, id: &str, include_data: bool) -> Result<ExecutionRecord> {
        let wire: WireExecution = self
            .client
            .get_with_query(&format!("executions/{}", id), &GetQuery { include_data })
            .await?;
        Ok(wire.into())
    }

    /// Delete an execution record.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.client.delete(&format!("executions/{}", id)).await
    }
}
