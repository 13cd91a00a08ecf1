//! Execution records: one run of a workflow and its per-node run records.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::workflow::WorkflowDefinition;

// ─────────────────────────────────────────────────────────────────────────────
// Status and mode
// ─────────────────────────────────────────────────────────────────────────────

/// Terminal or in-flight state of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Error,
    Waiting,
    Running,
    /// Anything the server reports that is not one of the above.
    Unknown,
}

impl ExecutionStatus {
    /// Parse a server status string. `crashed` counts as an error.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "success" => ExecutionStatus::Success,
            "error" | "crashed" => ExecutionStatus::Error,
            "waiting" => ExecutionStatus::Waiting,
            "running" | "new" => ExecutionStatus::Running,
            _ => ExecutionStatus::Unknown,
        }
    }

    /// Wire name, as used in list filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Error => "error",
            ExecutionStatus::Waiting => "waiting",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Unknown => "unknown",
        }
    }
}

/// How an execution was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Started by hand from the editor.
    Manual,
    /// Started by a trigger, webhook, schedule, retry, or the CLI.
    Triggered,
    /// Invoked as a sub-workflow by another execution.
    Integrated,
}

impl ExecutionMode {
    /// Parse a server mode string.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "manual" => ExecutionMode::Manual,
            "integrated" => ExecutionMode::Integrated,
            _ => ExecutionMode::Triggered,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Manual => "manual",
            ExecutionMode::Triggered => "triggered",
            ExecutionMode::Integrated => "integrated",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Node run records
// ─────────────────────────────────────────────────────────────────────────────

/// Where one run's input came from: an upstream node and its output slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    pub previous_node: String,
    pub previous_output_slot: usize,
    /// Which run of the upstream node produced the items (0 unless it looped).
    pub previous_run: usize,
}

/// Error recorded on a node run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl NodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            description: None,
            stack: None,
        }
    }
}

/// Parent linkage recorded by nodes that were invoked from another execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub parent_execution_id: String,
    pub parent_workflow_id: String,
}

/// One execution of one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRunRecord {
    /// Start time in milliseconds since the Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    /// Output slots, 0-based and dense; each holds item payloads.
    pub output: Vec<Vec<Value>>,
    /// The only record of where this run's input came from.
    pub source: Vec<SourceRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RunMetadata>,
}

impl NodeRunRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an output slot holding `items`.
    pub fn with_output_slot(mut self, items: Vec<Value>) -> Self {
        self.output.push(items);
        self
    }

    /// Append a source back-reference.
    pub fn with_source(mut self, previous_node: &str, slot: usize) -> Self {
        self.source.push(SourceRef {
            previous_node: previous_node.to_string(),
            previous_output_slot: slot,
            previous_run: 0,
        });
        self
    }

    /// Attach an error.
    pub fn with_error(mut self, error: NodeError) -> Self {
        self.error = Some(error);
        self
    }

    /// Attach parent-execution metadata.
    pub fn with_parent(mut self, execution_id: &str, workflow_id: &str) -> Self {
        self.metadata = Some(RunMetadata {
            parent_execution_id: execution_id.to_string(),
            parent_workflow_id: workflow_id.to_string(),
        });
        self
    }

    /// Set timing fields.
    pub fn with_timing(mut self, start_time: i64, execution_time_ms: u64) -> Self {
        self.start_time = Some(start_time);
        self.execution_time_ms = Some(execution_time_ms);
        self
    }

    /// Items on an output slot, if the slot exists.
    pub fn output_slot(&self, slot: usize) -> Option<&[Value]> {
        self.output.get(slot).map(Vec::as_slice)
    }

    /// Total items across all output slots.
    pub fn output_item_count(&self) -> usize {
        self.output.iter().map(Vec::len).sum()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Run data
// ─────────────────────────────────────────────────────────────────────────────

/// All run records of one node, in run order.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRuns {
    pub node: String,
    pub runs: Vec<NodeRunRecord>,
}

/// Per-node run records of an execution, in the order the server reported them.
///
/// The server reports nodes in execution order, and several analyses
/// ("first failing node", "first parent metadata") depend on that order, so
/// this is a sequence rather than a hash map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunData {
    entries: Vec<NodeRuns>,
}

impl RunData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append or extend the runs of `node`.
    pub fn push(&mut self, node: impl Into<String>, run: NodeRunRecord) {
        let node = node.into();
        match self.entries.iter_mut().find(|e| e.node == node) {
            Some(entry) => entry.runs.push(run),
            None => self.entries.push(NodeRuns {
                node,
                runs: vec![run],
            }),
        }
    }

    /// Runs of a node, if it ran at all.
    pub fn runs(&self, node: &str) -> Option<&[NodeRunRecord]> {
        self.entries
            .iter()
            .find(|e| e.node == node)
            .map(|e| e.runs.as_slice())
    }

    /// A specific run of a node.
    pub fn run(&self, node: &str, index: usize) -> Option<&NodeRunRecord> {
        self.runs(node).and_then(|runs| runs.get(index))
    }

    /// Iterate nodes in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeRuns> {
        self.entries.iter()
    }

    /// Node names in execution order.
    pub fn node_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.node.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<NodeRuns> for RunData {
    fn from_iter<I: IntoIterator<Item = NodeRuns>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Serialize for RunData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.node, &entry.runs)?;
        }
        map.end()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Executions
// ─────────────────────────────────────────────────────────────────────────────

/// Execution-level error summary reported alongside the run data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionError {
    pub message: String,
    /// Node the server blamed, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// One run of a workflow.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub mode: ExecutionMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
    pub run_data: RunData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    /// Workflow definition snapshot embedded in the execution, when present.
    #[serde(skip)]
    pub workflow: Option<WorkflowDefinition>,
}

impl ExecutionRecord {
    /// Create an execution with no run data.
    pub fn new(
        id: impl Into<String>,
        workflow_id: impl Into<String>,
        status: ExecutionStatus,
        mode: ExecutionMode,
    ) -> Self {
        Self {
            id: id.into(),
            workflow_id: workflow_id.into(),
            status,
            mode,
            started_at: None,
            stopped_at: None,
            run_data: RunData::new(),
            error: None,
            workflow: None,
        }
    }

    /// Append a run record for `node`.
    pub fn with_run(mut self, node: &str, run: NodeRunRecord) -> Self {
        self.run_data.push(node, run);
        self
    }

    /// Attach the embedded workflow snapshot.
    pub fn with_workflow(mut self, workflow: WorkflowDefinition) -> Self {
        self.workflow = Some(workflow);
        self
    }

    /// Wall-clock duration, when both timestamps are known.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.stopped_at) {
            (Some(start), Some(stop)) => Some(stop - start),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_parse() {
        assert_eq!(ExecutionStatus::parse("success"), ExecutionStatus::Success);
        assert_eq!(ExecutionStatus::parse("crashed"), ExecutionStatus::Error);
        assert_eq!(ExecutionStatus::parse("canceled"), ExecutionStatus::Unknown);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(ExecutionMode::parse("manual"), ExecutionMode::Manual);
        assert_eq!(ExecutionMode::parse("integrated"), ExecutionMode::Integrated);
        assert_eq!(ExecutionMode::parse("webhook"), ExecutionMode::Triggered);
        assert_eq!(ExecutionMode::parse("trigger"), ExecutionMode::Triggered);
    }

    #[test]
    fn test_run_data_preserves_order_and_groups_runs() {
        let mut data = RunData::new();
        data.push("Start", NodeRunRecord::new());
        data.push("Loop", NodeRunRecord::new());
        data.push("Body", NodeRunRecord::new());
        data.push("Loop", NodeRunRecord::new());

        assert_eq!(data.node_names(), vec!["Start", "Loop", "Body"]);
        assert_eq!(data.runs("Loop").map(<[_]>::len), Some(2));
        assert!(data.run("Body", 1).is_none());
    }

    #[test]
    fn test_run_data_serializes_as_ordered_map() {
        let mut data = RunData::new();
        data.push("Zeta", NodeRunRecord::new());
        data.push("Alpha", NodeRunRecord::new());

        let text = serde_json::to_string(&data).unwrap();
        let zeta = text.find("Zeta").unwrap();
        let alpha = text.find("Alpha").unwrap();
        assert!(zeta < alpha);
    }

    #[test]
    fn test_output_slot_access() {
        let run = NodeRunRecord::new()
            .with_output_slot(vec![json!({"a": 1})])
            .with_output_slot(vec![json!({"b": 2}), json!({"c": 3})]);
        assert_eq!(run.output_slot(1).map(<[_]>::len), Some(2));
        assert!(run.output_slot(2).is_none());
        assert_eq!(run.output_item_count(), 3);
    }
}
