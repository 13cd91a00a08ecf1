//! In-memory [`WorkflowSource`] for engine tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use flowtrace_client::{Error, Result, WorkflowSummary};
use flowtrace_types::{ExecutionRecord, WorkflowDefinition};

use crate::source::WorkflowSource;

#[derive(Default)]
pub(crate) struct MemorySource {
    workflows: Mutex<HashMap<String, WorkflowDefinition>>,
    executions: HashMap<String, ExecutionRecord>,
    broken: HashMap<String, String>,
    pub list_calls: AtomicUsize,
    pub workflow_calls: AtomicUsize,
    pub fail_list: AtomicBool,
    list_delay: Option<Duration>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workflow(self, workflow: WorkflowDefinition) -> Self {
        self.insert_workflow(workflow);
        self
    }

    pub fn with_execution(mut self, execution: ExecutionRecord) -> Self {
        self.executions.insert(execution.id.clone(), execution);
        self
    }

    /// Fetching `id` fails with a server error carrying `message`.
    pub fn with_broken_workflow(mut self, id: &str, message: &str) -> Self {
        self.broken.insert(id.to_string(), message.to_string());
        self
    }

    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = Some(delay);
        self
    }

    /// Add or replace a workflow after construction.
    pub fn insert_workflow(&self, workflow: WorkflowDefinition) {
        if let Ok(mut map) = self.workflows.lock() {
            map.insert(workflow.id.clone(), workflow);
        }
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkflowSource for MemorySource {
    async fn list_workflows(&self) -> Result<Vec<WorkflowSummary>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::Api {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        let map = self.workflows.lock().unwrap();
        let mut list: Vec<WorkflowSummary> = map
            .values()
            .map(|wf| WorkflowSummary {
                id: wf.id.clone(),
                name: wf.name.clone(),
                active: wf.active,
                tags: Vec::new(),
            })
            .collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(list)
    }

    async fn get_workflow(&self, id: &str) -> Result<WorkflowDefinition> {
        self.workflow_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.broken.get(id) {
            return Err(Error::Api {
                status: 500,
                message: message.clone(),
            });
        }
        self.workflows
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("workflow {}", id)))
    }

    async fn get_execution(&self, id: &str) -> Result<ExecutionRecord> {
        self.executions
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("execution {}", id)))
    }
}
