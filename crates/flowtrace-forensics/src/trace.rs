//! Error chain tracing.
//!
//! Explains a failed execution: which node failed and with what, whether the
//! execution was invoked by a parent, what the trigger received, and, when
//! the failure happened inside a called sub-workflow, which line of that
//! workflow's scripts most plausibly broke.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use flowtrace_types::value::blank_paths_in_items;
use flowtrace_types::{
    DataIssue, ExecutionMode, ExecutionRecord, ExecutionStatus, NodeError, NodeKind,
    WorkflowDefinition,
};

use crate::cache::NameCache;
use crate::code::{
    CodeContext, CodeIssue, DEFAULT_CONTEXT_LINES, find_issues, locate_error_context_with_stack,
};
use crate::dataflow::{NodeOutput, reconstruct};
use crate::error::{ForensicsError, NotFoundKind, Result};
use crate::source::WorkflowSource;

/// Longest error text kept per node in the node chain.
const CHAIN_ERROR_LIMIT: usize = 120;

/// Tracer tuning.
#[derive(Debug, Clone)]
pub struct TraceOptions {
    /// Lines of context around a located error line.
    pub context_lines: usize,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            context_lines: DEFAULT_CONTEXT_LINES,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Report types
// ─────────────────────────────────────────────────────────────────────────────

/// How the execution was started, as far as the record tells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Started on its own (trigger, webhook, schedule, manual run).
    Root,
    /// Invoked by a parent execution that the record names.
    Integrated,
    /// Marked as invoked by a parent, but no run carries the parent's ids.
    OriginUnknown,
}

/// Causal link to the invoking execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentLink {
    pub execution_id: String,
    pub workflow_id: String,
    pub workflow_name: String,
}

/// What the trigger node received, with blank fields flagged.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvidence {
    pub node: String,
    /// Paths of null or empty leaves. Advisory only.
    pub missing_parameters: Vec<String>,
    pub item_count: usize,
}

/// One executed node in run order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEntry {
    pub name: String,
    pub failed: bool,
    pub run_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Analysis of one script node in a called workflow.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NestedScript {
    pub node: String,
    pub issues: Vec<CodeIssue>,
    pub context: CodeContext,
}

/// The most plausible failing line across a called workflow's scripts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BestMatch {
    pub node: String,
    pub line: usize,
    pub confidence: f64,
}

/// Code context from the workflow a failed invoker node called.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NestedWorkflowContext {
    pub workflow_id: String,
    pub workflow_name: String,
    pub invoked_via: String,
    pub scripts: Vec<NestedScript>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_match: Option<BestMatch>,
}

/// Causal explanation of one execution's failure.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorTrace {
    pub execution_id: String,
    pub workflow_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_name: Option<String>,
    pub status: ExecutionStatus,
    pub mode: ExecutionMode,
    /// False when no node failed; the rest of the report is then mostly empty.
    pub has_failure: bool,
    pub failed_node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_node_type: Option<String>,
    pub error: Option<NodeError>,
    pub origin: Origin,
    /// `null` for root executions.
    pub parent: Option<ParentLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerEvidence>,
    pub node_chain: Vec<ChainEntry>,
    /// Located line when the failed node is itself a script.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_code: Option<CodeContext>,
    /// Present when the failed node invoked another workflow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nested: Option<NestedWorkflowContext>,
    /// Parts of the trace that could not be computed.
    pub issues: Vec<DataIssue>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tracer
// ─────────────────────────────────────────────────────────────────────────────

/// Builds [`ErrorTrace`]s.
pub struct ErrorTracer {
    source: Arc<dyn WorkflowSource>,
    names: Arc<NameCache>,
    options: TraceOptions,
}

impl ErrorTracer {
    pub fn new(source: Arc<dyn WorkflowSource>, names: Arc<NameCache>, options: TraceOptions) -> Self {
        Self {
            source,
            names,
            options,
        }
    }

    /// Trace execution `execution_id`.
    ///
    /// Only fetching the execution itself can fail. Every later fetch that
    /// fails leaves its part of the report empty and adds a [`DataIssue`].
    pub async fn trace(&self, execution_id: &str) -> Result<ErrorTrace> {
        let execution = self
            .source
            .get_execution(execution_id)
            .await
            .map_err(|e| ForensicsError::from_client(e, NotFoundKind::Execution, execution_id))?;

        Ok(self.trace_record(&execution).await)
    }

    /// Trace an execution that has already been fetched.
    pub async fn trace_record(&self, execution: &ExecutionRecord) -> ErrorTrace {
        let mut issues = Vec::new();
        let workflow = self.definition_for(execution, &mut issues).await;

        let failure = find_failure(execution);
        let (origin, parent_ids) = classify_origin(execution);
        let parent = match parent_ids {
            Some((execution_id, workflow_id)) => {
                let label = self.names.resolve(&workflow_id).await;
                Some(ParentLink {
                    execution_id,
                    workflow_id,
                    workflow_name: label.name,
                })
            }
            None => None,
        };

        let mut trace = ErrorTrace {
            execution_id: execution.id.clone(),
            workflow_id: execution.workflow_id.clone(),
            workflow_name: workflow.as_ref().map(|wf| wf.name.clone()),
            status: execution.status,
            mode: execution.mode,
            has_failure: failure.is_some(),
            failed_node: None,
            failed_node_type: None,
            error: None,
            origin,
            parent,
            trigger: trigger_evidence(execution, workflow.as_ref()),
            node_chain: node_chain(execution),
            local_code: None,
            nested: None,
            issues: Vec::new(),
        };

        let Some((failed_node, error)) = failure else {
            debug!(execution = %execution.id, "no failing node found");
            trace.issues = issues;
            return trace;
        };

        info!(
            execution = %execution.id,
            node = %failed_node,
            origin = ?trace.origin,
            "traced failure"
        );

        let definition = workflow.as_ref().and_then(|wf| wf.node(&failed_node));
        trace.failed_node_type = definition.map(|n| n.type_tag.clone());

        if let Some(node) = definition {
            match node.kind {
                NodeKind::Script => {
                    trace.local_code = node.script_text().map(|script| {
                        locate_error_context_with_stack(
                            script,
                            &error.message,
                            error.stack.as_deref(),
                            self.options.context_lines,
                        )
                    });
                }
                NodeKind::SubWorkflow => match node.sub_workflow_target() {
                    Some(target) => {
                        trace.nested = self
                            .nested_context(&node.name, &target.workflow_id, &error, &mut issues)
                            .await;
                    }
                    None => issues.push(DataIssue::UnresolvedSubWorkflowTarget {
                        node: node.name.clone(),
                    }),
                },
                NodeKind::Trigger
                | NodeKind::Branch
                | NodeKind::Loop
                | NodeKind::Merge
                | NodeKind::Generic => {}
            }
        }

        trace.failed_node = Some(failed_node);
        trace.error = Some(error);
        trace.issues = issues;
        trace
    }

    /// The embedded definition, or a fetched one.
    async fn definition_for(
        &self,
        execution: &ExecutionRecord,
        issues: &mut Vec<DataIssue>,
    ) -> Option<WorkflowDefinition> {
        if let Some(wf) = &execution.workflow {
            return Some(wf.clone());
        }
        if execution.workflow_id.is_empty() {
            return None;
        }

        match self.source.get_workflow(&execution.workflow_id).await {
            Ok(wf) => Some(wf),
            Err(e) => {
                warn!(workflow = %execution.workflow_id, error = %e, "workflow definition unavailable");
                issues.push(DataIssue::MissingDefinition {
                    workflow_id: execution.workflow_id.clone(),
                });
                None
            }
        }
    }

    /// Analyze the scripts of the workflow `invoker` called.
    async fn nested_context(
        &self,
        invoker: &str,
        workflow_id: &str,
        error: &NodeError,
        issues: &mut Vec<DataIssue>,
    ) -> Option<NestedWorkflowContext> {
        let nested = match self.source.get_workflow(workflow_id).await {
            Ok(wf) => wf,
            Err(e) => {
                warn!(workflow = %workflow_id, error = %e, "nested workflow unavailable");
                issues.push(DataIssue::FetchFailed {
                    target: format!("workflow {}", workflow_id),
                    message: e.to_string(),
                });
                return None;
            }
        };

        let scripts: Vec<NestedScript> = nested
            .nodes_of_kind(NodeKind::Script)
            .filter_map(|node| {
                let script = node.script_text()?;
                Some(NestedScript {
                    node: node.name.clone(),
                    issues: find_issues(script),
                    context: locate_error_context_with_stack(
                        script,
                        &error.message,
                        error.stack.as_deref(),
                        self.options.context_lines,
                    ),
                })
            })
            .collect();

        let mut best_match: Option<BestMatch> = None;
        for script in &scripts {
            let (true, Some(line)) = (script.context.found, script.context.error_line) else {
                continue;
            };
            if best_match
                .as_ref()
                .is_none_or(|best| script.context.confidence > best.confidence)
            {
                best_match = Some(BestMatch {
                    node: script.node.clone(),
                    line,
                    confidence: script.context.confidence,
                });
            }
        }

        debug!(
            workflow = %workflow_id,
            scripts = scripts.len(),
            located = best_match.is_some(),
            "analyzed nested workflow"
        );

        Some(NestedWorkflowContext {
            workflow_id: workflow_id.to_string(),
            workflow_name: nested.name,
            invoked_via: invoker.to_string(),
            scripts,
            best_match,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pure steps
// ─────────────────────────────────────────────────────────────────────────────

/// First node, in run order, with a run that carries an error.
///
/// Falls back to the node named by the execution-level error.
pub fn find_failure(execution: &ExecutionRecord) -> Option<(String, NodeError)> {
    for entry in execution.run_data.iter() {
        if let Some(error) = entry.runs.iter().find_map(|run| run.error.clone()) {
            return Some((entry.node.clone(), error));
        }
    }

    let exec_error = execution.error.as_ref()?;
    let node = exec_error.node.clone()?;
    Some((
        node,
        NodeError {
            message: exec_error.message.clone(),
            description: None,
            stack: exec_error.stack.clone(),
        },
    ))
}

/// Origin and, for integrated executions, the first recorded parent ids.
///
/// The first run carrying parent metadata wins; several differing entries
/// are not reconciled.
pub fn classify_origin(execution: &ExecutionRecord) -> (Origin, Option<(String, String)>) {
    if execution.mode != ExecutionMode::Integrated {
        return (Origin::Root, None);
    }

    let parent = execution
        .run_data
        .iter()
        .flat_map(|entry| entry.runs.iter())
        .find_map(|run| run.metadata.as_ref())
        .map(|meta| {
            (
                meta.parent_execution_id.clone(),
                meta.parent_workflow_id.clone(),
            )
        });

    match parent {
        Some(ids) => (Origin::Integrated, Some(ids)),
        None => (Origin::OriginUnknown, None),
    }
}

/// Name of the node that started the execution.
fn trigger_node<'a>(
    execution: &'a ExecutionRecord,
    workflow: Option<&WorkflowDefinition>,
) -> Option<&'a str> {
    let run_data = &execution.run_data;

    let declared = workflow.and_then(|wf| {
        wf.nodes_of_kind(NodeKind::Trigger)
            .find_map(|node| run_data.iter().find(|e| e.node == node.name))
    });

    declared
        .or_else(|| {
            run_data
                .iter()
                .find(|e| e.runs.first().is_some_and(|run| run.source.is_empty()))
        })
        .map(|e| e.node.as_str())
}

/// Blank fields in what the trigger received.
///
/// Triggers rarely have an input of their own, so their output stands in
/// when the input is empty.
fn trigger_evidence(
    execution: &ExecutionRecord,
    workflow: Option<&WorkflowDefinition>,
) -> Option<TriggerEvidence> {
    let node = trigger_node(execution, workflow)?;
    let flow = reconstruct(execution, node, 0).ok()?;

    let items: Vec<Value> = if flow.input.item_count() > 0 {
        flow.input.items().into_iter().cloned().collect()
    } else {
        match flow.output {
            NodeOutput::Single(items) => items,
            NodeOutput::Slots(slots) => slots.into_iter().flat_map(|s| s.items).collect(),
        }
    };

    Some(TriggerEvidence {
        node: node.to_string(),
        missing_parameters: blank_paths_in_items(&items),
        item_count: items.len(),
    })
}

fn node_chain(execution: &ExecutionRecord) -> Vec<ChainEntry> {
    execution
        .run_data
        .iter()
        .map(|entry| {
            let error = entry.runs.iter().find_map(|run| run.error.as_ref());
            ChainEntry {
                name: entry.node.clone(),
                failed: error.is_some(),
                run_count: entry.runs.len(),
                execution_time_ms: entry.runs.first().and_then(|r| r.execution_time_ms),
                error: error.map(|e| truncate(&e.message, CHAIN_ERROR_LIMIT)),
            }
        })
        .collect()
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(limit).collect();
    cut.push('…');
    cut
}
