//! Data-flow reconstruction.
//!
//! The server stores what each node produced, plus a `source` back-reference
//! per run naming the upstream node and output slot it consumed. A node's
//! input is therefore never stored; it is rebuilt here from its sources'
//! outputs. Everything in this module is a pure function of the execution
//! record.

use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use flowtrace_types::{DataIssue, ExecutionRecord, NodeError, NodeRunRecord, RunData, SourceRef};

use crate::error::{ForensicsError, NotFoundKind, Result};

/// Label of output slot 0.
pub const PRIMARY_SLOT_LABEL: &str = "primary";

/// Items one source contributed to a multi-input node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceGroup {
    pub source_node: String,
    pub source_slot: usize,
    pub items: Vec<Value>,
    /// False when the upstream run or slot was missing; `items` is then empty.
    pub available: bool,
}

/// Logical input of a node run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NodeInput {
    /// Zero or one source: the items themselves.
    Single(Vec<Value>),
    /// Several sources, one group each, in source order. Never merged.
    Multi(Vec<SourceGroup>),
}

impl NodeInput {
    /// Total items across all groups.
    pub fn item_count(&self) -> usize {
        match self {
            NodeInput::Single(items) => items.len(),
            NodeInput::Multi(groups) => groups.iter().map(|g| g.items.len()).sum(),
        }
    }

    /// All items, flattened in group order.
    pub fn items(&self) -> Vec<&Value> {
        match self {
            NodeInput::Single(items) => items.iter().collect(),
            NodeInput::Multi(groups) => groups.iter().flat_map(|g| g.items.iter()).collect(),
        }
    }
}

/// One non-empty output slot of a multi-output node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSlot {
    pub slot_index: usize,
    pub slot_label: String,
    pub items: Vec<Value>,
}

/// Output of a node run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NodeOutput {
    /// One output slot: its items.
    Single(Vec<Value>),
    /// Several slots: the non-empty ones, ascending.
    Slots(Vec<OutputSlot>),
}

impl NodeOutput {
    /// Total items across all slots.
    pub fn item_count(&self) -> usize {
        match self {
            NodeOutput::Single(items) => items.len(),
            NodeOutput::Slots(slots) => slots.iter().map(|s| s.items.len()).sum(),
        }
    }

    /// Whether nothing was produced.
    pub fn is_empty(&self) -> bool {
        self.item_count() == 0
    }
}

/// Reconstructed view of one node run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDataFlow {
    pub execution_id: String,
    pub node_name: String,
    pub run_index: usize,
    /// How many times the node ran in this execution.
    pub run_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    pub sources: Vec<SourceRef>,
    pub input: NodeInput,
    pub output: NodeOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeError>,
    /// Sources whose upstream run or slot could not be found.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved_sources: Vec<DataIssue>,
}

/// Find the node in `run_data` that `query` names.
///
/// Exact match first, then case-insensitive, then the first node whose name
/// contains the query (case-insensitive).
pub fn resolve_node_name<'a>(run_data: &'a RunData, query: &str) -> Option<&'a str> {
    let names = || run_data.iter().map(|e| e.node.as_str());
    let lower = query.to_lowercase();

    names()
        .find(|n| *n == query)
        .or_else(|| names().find(|n| n.to_lowercase() == lower))
        .or_else(|| names().find(|n| n.to_lowercase().contains(&lower)))
}

/// Reconstruct input and output of one run of `node`.
///
/// `node` is matched with [`resolve_node_name`]. An unknown node or run index
/// is a `NotFound` listing the alternatives; a dangling source is not an
/// error and is reported in `unresolved_sources`.
pub fn reconstruct(
    execution: &ExecutionRecord,
    node: &str,
    run_index: usize,
) -> Result<NodeDataFlow> {
    let run_data = &execution.run_data;
    let node_name = resolve_node_name(run_data, node)
        .ok_or_else(|| ForensicsError::node_not_found(node, run_data.node_names()))?;

    let runs = run_data.runs(node_name).unwrap_or_default();
    let run = runs.get(run_index).ok_or_else(|| ForensicsError::NotFound {
        kind: NotFoundKind::Run,
        id: format!("{}#{}", node_name, run_index),
        available: (0..runs.len()).map(|i| i.to_string()).collect(),
    })?;

    let (input, unresolved_sources) = reconstruct_input(run_data, node_name, run);
    let output = reconstruct_output(run);

    trace!(
        node = node_name,
        run = run_index,
        input = input.item_count(),
        output = output.item_count(),
        "reconstructed node data flow"
    );

    Ok(NodeDataFlow {
        execution_id: execution.id.clone(),
        node_name: node_name.to_string(),
        run_index,
        run_count: runs.len(),
        start_time: run.start_time,
        execution_time_ms: run.execution_time_ms,
        sources: run.source.clone(),
        input,
        output,
        error: run.error.clone(),
        unresolved_sources,
    })
}

/// Rebuild the logical input of `run` from its source back-references.
pub fn reconstruct_input(
    run_data: &RunData,
    node_name: &str,
    run: &NodeRunRecord,
) -> (NodeInput, Vec<DataIssue>) {
    let mut issues = Vec::new();
    let mut groups = Vec::with_capacity(run.source.len());

    for source in &run.source {
        let items = run_data
            .run(&source.previous_node, source.previous_run)
            .and_then(|upstream| upstream.output_slot(source.previous_output_slot));

        if items.is_none() {
            issues.push(DataIssue::DanglingSource {
                node: node_name.to_string(),
                previous_node: source.previous_node.clone(),
                slot: source.previous_output_slot,
            });
        }

        groups.push(SourceGroup {
            source_node: source.previous_node.clone(),
            source_slot: source.previous_output_slot,
            available: items.is_some(),
            items: items.map(<[Value]>::to_vec).unwrap_or_default(),
        });
    }

    let input = if groups.len() > 1 {
        NodeInput::Multi(groups)
    } else {
        NodeInput::Single(groups.pop().map(|g| g.items).unwrap_or_default())
    };
    (input, issues)
}

/// Shape the recorded output of `run`.
pub fn reconstruct_output(run: &NodeRunRecord) -> NodeOutput {
    if run.output.len() <= 1 {
        return NodeOutput::Single(run.output.first().cloned().unwrap_or_default());
    }

    NodeOutput::Slots(
        run.output
            .iter()
            .enumerate()
            .filter(|(_, items)| !items.is_empty())
            .map(|(slot_index, items)| OutputSlot {
                slot_index,
                slot_label: slot_label(slot_index),
                items: items.clone(),
            })
            .collect(),
    )
}

fn slot_label(slot: usize) -> String {
    if slot == 0 {
        PRIMARY_SLOT_LABEL.to_string()
    } else {
        format!("output {}", slot)
    }
}
