//! Wire types for the n8n public API and their conversion into domain types.
//!
//! These mirror the server's JSON loosely: every field that older or newer
//! servers may omit is optional, and ids are accepted as either strings or
//! numbers. Nothing outside this module sees these structs.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use flowtrace_types::{
    Connection, ExecutionError, ExecutionMode, ExecutionRecord, ExecutionStatus, NodeDefinition,
    NodeError, NodeKind, NodeRunRecord, NodeRuns, RunData, RunMetadata, SourceRef,
    WorkflowDefinition,
};

// ─────────────────────────────────────────────────────────────────────────────
// Pagination
// ─────────────────────────────────────────────────────────────────────────────

/// One page of a cursor-paginated list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Items on this page.
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    /// Cursor for the next page, absent on the last one.
    #[serde(default)]
    pub next_cursor: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Ids
// ─────────────────────────────────────────────────────────────────────────────

/// Deserialize an id that may arrive as a string or a number.
fn flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

/// Like [`flexible_id`] but tolerates `null` and absence.
fn optional_flexible_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Workflows
// ─────────────────────────────────────────────────────────────────────────────

/// Workflow tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    #[serde(default, deserialize_with = "optional_flexible_id")]
    pub id: Option<String>,
    pub name: String,
}

/// Workflow as it appears in list responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSummary {
    /// Workflow ID.
    #[serde(deserialize_with = "flexible_id")]
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Whether the workflow is activated.
    #[serde(default)]
    pub active: bool,
    /// Tags attached to the workflow.
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// Node as it appears inside a workflow body.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireNode {
    #[serde(default, deserialize_with = "optional_flexible_id")]
    id: Option<String>,
    name: String,
    #[serde(rename = "type", default)]
    type_tag: String,
    #[serde(default)]
    parameters: Value,
    #[serde(default)]
    disabled: bool,
}

impl From<WireNode> for NodeDefinition {
    fn from(node: WireNode) -> Self {
        let parameters = match node.parameters {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        NodeDefinition {
            id: node.id,
            kind: NodeKind::classify(&node.type_tag),
            name: node.name,
            type_tag: node.type_tag,
            parameters,
            disabled: node.disabled,
        }
    }
}

/// One connection target in the nested connection map.
#[derive(Debug, Clone, Deserialize)]
struct WireEdge {
    node: String,
    #[serde(default)]
    index: usize,
}

/// `{ channel: [ slot -> [edge] | null ] }`, keyed by source node.
type WireConnections = Map<String, Value>;

/// Full workflow body.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireWorkflow {
    #[serde(default, deserialize_with = "optional_flexible_id")]
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    nodes: Vec<WireNode>,
    #[serde(default)]
    connections: WireConnections,
    #[serde(default)]
    settings: Option<Map<String, Value>>,
}

impl WireWorkflow {
    /// Convert into a domain definition, falling back to `fallback_id` when
    /// the body carries none (embedded execution snapshots sometimes don't).
    pub(crate) fn into_definition(self, fallback_id: &str) -> WorkflowDefinition {
        let nodes: Vec<NodeDefinition> = self.nodes.into_iter().map(NodeDefinition::from).collect();
        let connections = flatten_connections(&nodes, &self.connections);
        WorkflowDefinition {
            id: self.id.unwrap_or_else(|| fallback_id.to_string()),
            name: self.name,
            active: self.active,
            nodes,
            connections,
            settings: self.settings.unwrap_or_default(),
        }
    }
}

impl From<WireWorkflow> for WorkflowDefinition {
    fn from(workflow: WireWorkflow) -> Self {
        workflow.into_definition("")
    }
}

/// Flatten the nested connection map into edges.
///
/// Sources are visited in node definition order so the result is stable;
/// sources that name no node follow in key order.
fn flatten_connections(nodes: &[NodeDefinition], raw: &WireConnections) -> Vec<Connection> {
    let mut order: Vec<&str> = nodes
        .iter()
        .map(|n| n.name.as_str())
        .filter(|name| raw.contains_key(*name))
        .collect();
    for key in raw.keys() {
        if !order.contains(&key.as_str()) {
            order.push(key.as_str());
        }
    }

    let mut edges = Vec::new();
    for source in order {
        let Some(Value::Object(channels)) = raw.get(source) else {
            continue;
        };
        for (channel, slots) in channels {
            let Value::Array(slots) = slots else {
                continue;
            };
            for (slot, targets) in slots.iter().enumerate() {
                let Value::Array(targets) = targets else {
                    continue;
                };
                for target in targets {
                    let Ok(edge) = serde_json::from_value::<WireEdge>(target.clone()) else {
                        continue;
                    };
                    edges.push(Connection {
                        source_node: source.to_string(),
                        source_slot: slot,
                        target_node: edge.node,
                        target_slot: edge.index,
                        channel: channel.clone(),
                    });
                }
            }
        }
    }
    edges
}

// ─────────────────────────────────────────────────────────────────────────────
// Executions
// ─────────────────────────────────────────────────────────────────────────────

/// Execution as returned by `GET /executions` and `GET /executions/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireExecution {
    #[serde(deserialize_with = "flexible_id")]
    id: String,
    #[serde(default, deserialize_with = "optional_flexible_id")]
    workflow_id: Option<String>,
    #[serde(default)]
    finished: bool,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    stopped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    data: Option<WireExecutionData>,
    #[serde(default)]
    workflow_data: Option<WireWorkflow>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireExecutionData {
    #[serde(default)]
    result_data: WireResultData,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResultData {
    #[serde(default)]
    run_data: OrderedRunData,
    #[serde(default)]
    error: Option<WireExecutionError>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireExecutionError {
    #[serde(default)]
    message: Option<String>,
    /// Either a bare node name or a node object with a `name`.
    #[serde(default)]
    node: Option<Value>,
    #[serde(default)]
    stack: Option<String>,
}

impl From<WireExecutionError> for ExecutionError {
    fn from(err: WireExecutionError) -> Self {
        let node = match err.node {
            Some(Value::String(name)) => Some(name),
            Some(Value::Object(obj)) => obj.get("name").and_then(Value::as_str).map(str::to_string),
            _ => None,
        };
        ExecutionError {
            message: err.message.unwrap_or_else(|| "Unknown error".to_string()),
            node,
            stack: err.stack,
        }
    }
}

/// Run data in server order.
///
/// `serde_json::Map` sorts its keys, which would lose the execution order the
/// server reports nodes in, so the map is visited by hand.
#[derive(Debug, Clone, Default)]
struct OrderedRunData(Vec<(String, Vec<WireRun>)>);

impl<'de> Deserialize<'de> for OrderedRunData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RunDataVisitor;

        impl<'de> Visitor<'de> for RunDataVisitor {
            type Value = OrderedRunData;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of node name to run records")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((node, runs)) = access.next_entry::<String, Option<Vec<WireRun>>>()? {
                    entries.push((node, runs.unwrap_or_default()));
                }
                Ok(OrderedRunData(entries))
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
                Ok(OrderedRunData::default())
            }
        }

        deserializer.deserialize_any(RunDataVisitor)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRun {
    #[serde(default)]
    start_time: Option<i64>,
    #[serde(default)]
    execution_time: Option<u64>,
    #[serde(default)]
    source: Option<Vec<Option<WireSource>>>,
    #[serde(default)]
    data: Option<WireRunOutput>,
    #[serde(default)]
    error: Option<WireNodeError>,
    #[serde(default)]
    metadata: Option<WireRunMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSource {
    previous_node: String,
    #[serde(default)]
    previous_node_output: Option<usize>,
    #[serde(default)]
    previous_node_run: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct WireRunOutput {
    #[serde(default)]
    main: Vec<Option<Vec<Value>>>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireNodeError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    stack: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRunMetadata {
    #[serde(default)]
    parent_execution: Option<WireParentExecution>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireParentExecution {
    #[serde(deserialize_with = "flexible_id")]
    execution_id: String,
    #[serde(default, deserialize_with = "optional_flexible_id")]
    workflow_id: Option<String>,
}

/// Unwrap an item to its `json` payload.
fn item_payload(item: Value) -> Value {
    match item {
        Value::Object(mut obj) if obj.contains_key("json") => {
            obj.remove("json").unwrap_or(Value::Null)
        }
        other => other,
    }
}

impl From<WireRun> for NodeRunRecord {
    fn from(run: WireRun) -> Self {
        let output = run
            .data
            .unwrap_or_default()
            .main
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_default()
                    .into_iter()
                    .map(item_payload)
                    .collect()
            })
            .collect();

        let source = run
            .source
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .map(|s| SourceRef {
                previous_node: s.previous_node,
                previous_output_slot: s.previous_node_output.unwrap_or(0),
                previous_run: s.previous_node_run.unwrap_or(0),
            })
            .collect();

        let error = run.error.map(|e| NodeError {
            message: e.message.unwrap_or_else(|| "Unknown error".to_string()),
            description: e.description,
            stack: e.stack,
        });

        let metadata = run
            .metadata
            .and_then(|m| m.parent_execution)
            .map(|p| RunMetadata {
                parent_execution_id: p.execution_id,
                parent_workflow_id: p.workflow_id.unwrap_or_default(),
            });

        NodeRunRecord {
            start_time: run.start_time,
            execution_time_ms: run.execution_time,
            output,
            source,
            error,
            metadata,
        }
    }
}

impl From<WireExecution> for ExecutionRecord {
    fn from(exec: WireExecution) -> Self {
        let result = exec.data.unwrap_or_default().result_data;
        let error: Option<ExecutionError> = result.error.map(ExecutionError::from);

        let status = match exec.status.as_deref() {
            Some(raw) => ExecutionStatus::parse(raw),
            None if error.is_some() => ExecutionStatus::Error,
            None if exec.finished => ExecutionStatus::Success,
            None => ExecutionStatus::Unknown,
        };
        let mode = exec
            .mode
            .as_deref()
            .map(ExecutionMode::parse)
            .unwrap_or(ExecutionMode::Triggered);

        let workflow = exec
            .workflow_data
            .map(|wf| wf.into_definition(exec.workflow_id.as_deref().unwrap_or_default()));
        let workflow_id = exec
            .workflow_id
            .or_else(|| workflow.as_ref().map(|wf| wf.id.clone()))
            .unwrap_or_default();

        let run_data: RunData = result
            .run_data
            .0
            .into_iter()
            .map(|(node, runs)| NodeRuns {
                node,
                runs: runs.into_iter().map(NodeRunRecord::from).collect(),
            })
            .collect();

        ExecutionRecord {
            id: exec.id,
            workflow_id,
            status,
            mode,
            started_at: exec.started_at,
            stopped_at: exec.stopped_at,
            run_data,
            error,
            workflow,
        }
    }
}
