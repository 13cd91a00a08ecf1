//! Structural integrity checks over a single workflow definition.
//!
//! Every check runs regardless of what earlier checks found. Findings are
//! weighted by category and severity and subtracted from 100.

use std::collections::{BTreeSet, HashSet, VecDeque};

use serde::Serialize;
use tracing::debug;

use flowtrace_types::{DataIssue, NodeDefinition, NodeKind, Severity, WorkflowDefinition};

use crate::code::{CodeIssue, find_issues};

/// Generic node types that are expected to pass their items on.
const OUTPUT_EXPECTED_TYPES: &[&str] = &["set", "httprequest", "postgres", "supabase", "redis"];

/// Canvas annotations; never connected.
const ANNOTATION_TYPES: &[&str] = &["stickynote"];

/// Branch types whose slot 0 is the true path and slot 1 the false path.
const TWO_WAY_BRANCHES: &[&str] = &["if", "filter"];

/// Which check produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingKind {
    DeadEnd,
    BrokenLoop,
    MissingCompletion,
    Orphan,
    UnwiredBranch,
    MissingTruePath,
    MissingFalsePath,
}

/// One structural finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub node: String,
    pub node_type: String,
    pub severity: Severity,
    #[serde(rename = "type")]
    pub kind: FindingKind,
    pub message: String,
}

impl Finding {
    fn new(node: &NodeDefinition, severity: Severity, kind: FindingKind, message: impl Into<String>) -> Self {
        Self {
            node: node.name.clone(),
            node_type: node.type_tag.clone(),
            severity,
            kind,
            message: message.into(),
        }
    }
}

/// Script issues of one node.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCodeIssues {
    pub node: String,
    pub issues: Vec<CodeIssue>,
}

/// A resolved call into another workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubWorkflowReference {
    pub node: String,
    pub workflow_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_name: Option<String>,
    pub disabled: bool,
}

/// Whether the definition looks like a full export or a pasted fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentStatus {
    pub is_fragment: bool,
    /// Top-level parts that are absent or empty.
    pub missing: Vec<String>,
}

/// Result of [`analyze`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub workflow_id: String,
    pub workflow_name: String,
    pub node_count: usize,
    pub dead_ends: Vec<Finding>,
    pub loop_issues: Vec<Finding>,
    pub orphaned_nodes: Vec<Finding>,
    pub branch_issues: Vec<Finding>,
    pub code_issues: Vec<NodeCodeIssues>,
    pub sub_workflow_references: Vec<SubWorkflowReference>,
    pub fragment_status: FragmentStatus,
    pub issues: Vec<DataIssue>,
    /// 0 to 100.
    pub integrity_score: u8,
}

impl IntegrityReport {
    /// Structural findings plus individual code issues.
    pub fn finding_count(&self) -> usize {
        self.dead_ends.len()
            + self.loop_issues.len()
            + self.orphaned_nodes.len()
            + self.branch_issues.len()
            + self.code_issues.iter().map(|c| c.issues.len()).sum::<usize>()
    }

    /// Whether nothing at all was found.
    pub fn is_clean(&self) -> bool {
        self.finding_count() == 0 && self.issues.is_empty()
    }

    /// Total penalty of all findings before clamping.
    fn penalty(&self) -> u32 {
        let structural = |findings: &[Finding], critical: u32, other: u32| -> u32 {
            findings
                .iter()
                .map(|f| if f.severity == Severity::Critical { critical } else { other })
                .sum()
        };

        let code: u32 = self
            .code_issues
            .iter()
            .flat_map(|c| c.issues.iter())
            .map(|issue| match issue.severity {
                Severity::Critical | Severity::Error => 5,
                Severity::Warning => 2,
            })
            .sum();

        structural(&self.dead_ends, 15, 5)
            + structural(&self.loop_issues, 20, 10)
            + structural(&self.orphaned_nodes, 15, 5)
            + structural(&self.branch_issues, 10, 3)
            + code
    }
}

/// Run every check against `workflow`.
pub fn analyze(workflow: &WorkflowDefinition) -> IntegrityReport {
    let (sub_workflow_references, issues) = sub_workflow_references(workflow);

    let mut report = IntegrityReport {
        workflow_id: workflow.id.clone(),
        workflow_name: workflow.name.clone(),
        node_count: workflow.nodes.len(),
        dead_ends: dead_ends(workflow),
        loop_issues: loop_issues(workflow),
        orphaned_nodes: orphaned_nodes(workflow),
        branch_issues: branch_issues(workflow),
        code_issues: code_issues(workflow),
        sub_workflow_references,
        fragment_status: fragment_status(workflow),
        issues,
        integrity_score: 100,
    };

    report.integrity_score = 100u32.saturating_sub(report.penalty()) as u8;

    debug!(
        workflow = %workflow.id,
        findings = report.finding_count(),
        score = report.integrity_score,
        "integrity analysis complete"
    );
    report
}

// ─────────────────────────────────────────────────────────────────────────────
// Checks
// ─────────────────────────────────────────────────────────────────────────────

fn enabled_nodes(workflow: &WorkflowDefinition) -> impl Iterator<Item = &NodeDefinition> {
    workflow.nodes.iter().filter(|n| !n.disabled)
}

fn has_main_outgoing(workflow: &WorkflowDefinition, name: &str) -> bool {
    workflow.outgoing(name).any(|c| c.is_main())
}

fn expects_output(node: &NodeDefinition) -> bool {
    match node.kind {
        NodeKind::Script | NodeKind::Branch | NodeKind::Loop | NodeKind::Merge => true,
        NodeKind::Generic => OUTPUT_EXPECTED_TYPES.contains(&node.type_suffix().as_str()),
        NodeKind::Trigger | NodeKind::SubWorkflow => false,
    }
}

fn dead_ends(workflow: &WorkflowDefinition) -> Vec<Finding> {
    enabled_nodes(workflow)
        .filter(|node| expects_output(node) && !has_main_outgoing(workflow, &node.name))
        .map(|node| {
            Finding::new(
                node,
                Severity::Critical,
                FindingKind::DeadEnd,
                format!("{} node has no outgoing connection", node.kind.label()),
            )
        })
        .collect()
}

/// Nodes reachable over `main` connections from `start`'s outputs.
fn reachable_from(workflow: &WorkflowDefinition, start: &str) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut queue: VecDeque<&str> = workflow
        .outgoing(start)
        .filter(|c| c.is_main())
        .map(|c| c.target_node.as_str())
        .collect();

    while let Some(name) = queue.pop_front() {
        if !seen.insert(name.to_string()) {
            continue;
        }
        queue.extend(
            workflow
                .outgoing(name)
                .filter(|c| c.is_main())
                .map(|c| c.target_node.as_str()),
        );
    }
    seen
}

fn loop_issues(workflow: &WorkflowDefinition) -> Vec<Finding> {
    let mut findings = Vec::new();

    for node in enabled_nodes(workflow).filter(|n| n.kind == NodeKind::Loop) {
        let reachable = reachable_from(workflow, &node.name);
        let has_back_edge = workflow
            .incoming(&node.name)
            .any(|c| c.is_main() && reachable.contains(&c.source_node));

        if !has_back_edge {
            findings.push(Finding::new(
                node,
                Severity::Critical,
                FindingKind::BrokenLoop,
                "no connection leads back into the loop",
            ));
            continue;
        }

        let wired_slots: BTreeSet<usize> = workflow
            .outgoing(&node.name)
            .filter(|c| c.is_main())
            .map(|c| c.source_slot)
            .collect();
        if wired_slots.len() < 2 {
            findings.push(Finding::new(
                node,
                Severity::Warning,
                FindingKind::MissingCompletion,
                "loop has no separate completion output",
            ));
        }
    }

    findings
}

fn orphaned_nodes(workflow: &WorkflowDefinition) -> Vec<Finding> {
    enabled_nodes(workflow)
        .filter(|node| node.kind != NodeKind::Trigger)
        .filter(|node| !ANNOTATION_TYPES.contains(&node.type_suffix().as_str()))
        .filter(|node| !workflow.incoming(&node.name).any(|c| c.is_main()))
        // Sub-nodes attach to their parent over a non-main channel.
        .filter(|node| !workflow.outgoing(&node.name).any(|c| !c.is_main()))
        .map(|node| {
            let severity = match node.kind {
                NodeKind::Branch | NodeKind::Loop | NodeKind::Merge => Severity::Critical,
                _ => Severity::Warning,
            };
            Finding::new(node, severity, FindingKind::Orphan, "node has no incoming connection")
        })
        .collect()
}

fn branch_issues(workflow: &WorkflowDefinition) -> Vec<Finding> {
    let mut findings = Vec::new();

    for node in enabled_nodes(workflow).filter(|n| n.kind == NodeKind::Branch) {
        let wired: BTreeSet<usize> = workflow
            .outgoing(&node.name)
            .filter(|c| c.is_main())
            .map(|c| c.source_slot)
            .collect();

        if wired.is_empty() {
            findings.push(Finding::new(
                node,
                Severity::Critical,
                FindingKind::UnwiredBranch,
                "branch has no outgoing connection",
            ));
            continue;
        }

        if !TWO_WAY_BRANCHES.contains(&node.type_suffix().as_str()) {
            continue;
        }
        if !wired.contains(&0) {
            findings.push(Finding::new(
                node,
                Severity::Warning,
                FindingKind::MissingTruePath,
                "true path is not connected",
            ));
        }
        if !wired.contains(&1) {
            findings.push(Finding::new(
                node,
                Severity::Warning,
                FindingKind::MissingFalsePath,
                "false path is not connected",
            ));
        }
    }

    findings
}

fn code_issues(workflow: &WorkflowDefinition) -> Vec<NodeCodeIssues> {
    workflow
        .nodes_of_kind(NodeKind::Script)
        .filter_map(|node| {
            let issues = find_issues(node.script_text()?);
            (!issues.is_empty()).then(|| NodeCodeIssues {
                node: node.name.clone(),
                issues,
            })
        })
        .collect()
}

fn sub_workflow_references(
    workflow: &WorkflowDefinition,
) -> (Vec<SubWorkflowReference>, Vec<DataIssue>) {
    let mut references = Vec::new();
    let mut issues = Vec::new();

    for node in workflow.nodes_of_kind(NodeKind::SubWorkflow) {
        match node.sub_workflow_target() {
            Some(target) => references.push(SubWorkflowReference {
                node: node.name.clone(),
                workflow_id: target.workflow_id,
                cached_name: target.cached_name,
                disabled: node.disabled,
            }),
            None => issues.push(DataIssue::UnresolvedSubWorkflowTarget {
                node: node.name.clone(),
            }),
        }
    }

    (references, issues)
}

fn fragment_status(workflow: &WorkflowDefinition) -> FragmentStatus {
    let checks = [
        ("id", workflow.id.is_empty()),
        ("name", workflow.name.is_empty()),
        ("settings", workflow.settings.is_empty()),
        ("nodes", workflow.nodes.is_empty()),
    ];
    let missing: Vec<String> = checks
        .iter()
        .filter(|(_, absent)| *absent)
        .map(|(part, _)| part.to_string())
        .collect();

    FragmentStatus {
        is_fragment: !missing.is_empty(),
        missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(name: &str, suffix: &str) -> NodeDefinition {
        NodeDefinition::new(name, format!("n8n-nodes-base.{}", suffix))
    }

    fn clean_workflow() -> WorkflowDefinition {
        let mut wf = WorkflowDefinition::new("W1", "Clean")
            .with_node(node("Hook", "webhook"))
            .with_node(node("Check", "if"))
            .with_node(node("Save", "postgres"))
            .with_node(node("Skip", "noOp"))
            .with_node(node("Done", "respondToWebhook"))
            .connect("Hook", 0, "Check")
            .connect("Check", 0, "Save")
            .connect("Check", 1, "Skip")
            .connect("Save", 0, "Done");
        wf.settings.insert("executionOrder".into(), json!("v1"));
        wf
    }

    #[test]
    fn test_clean_workflow_scores_100() {
        let report = analyze(&clean_workflow());
        assert!(report.is_clean(), "{:?}", report);
        assert_eq!(report.integrity_score, 100);
        assert!(!report.fragment_status.is_fragment);
    }

    #[test]
    fn test_critical_finding_lowers_score() {
        let wf = clean_workflow().with_node(node("Lost Merge", "merge"));
        let report = analyze(&wf);

        // Unconnected merge: dead end and orphan, both critical.
        assert_eq!(report.dead_ends.len(), 1);
        assert_eq!(report.orphaned_nodes.len(), 1);
        assert_eq!(report.orphaned_nodes[0].severity, Severity::Critical);
        assert!(report.integrity_score < 100);
        assert_eq!(report.integrity_score, 70);
    }

    #[test]
    fn test_score_never_below_zero() {
        let wf = (0..20).fold(clean_workflow(), |wf, i| {
            wf.with_node(node(&format!("Lost {}", i), "merge"))
        });
        let report = analyze(&wf);
        assert_eq!(report.integrity_score, 0);
    }

    #[test]
    fn test_branch_with_only_true_path() {
        let wf = WorkflowDefinition::new("W2", "Half")
            .with_node(node("Start", "manualTrigger"))
            .with_node(node("Gate", "if"))
            .with_node(node("Yes", "noOp"))
            .connect("Start", 0, "Gate")
            .connect("Gate", 0, "Yes");
        let report = analyze(&wf);

        assert_eq!(report.branch_issues.len(), 1);
        assert_eq!(report.branch_issues[0].node, "Gate");
        assert_eq!(report.branch_issues[0].kind, FindingKind::MissingFalsePath);
        assert_eq!(report.integrity_score, 97);
    }

    #[test]
    fn test_unwired_switch_single_critical() {
        let wf = WorkflowDefinition::new("W3", "Switch")
            .with_node(node("Start", "manualTrigger"))
            .with_node(node("Route", "switch"))
            .connect("Start", 0, "Route");
        let report = analyze(&wf);

        assert_eq!(report.branch_issues.len(), 1);
        assert_eq!(report.branch_issues[0].kind, FindingKind::UnwiredBranch);
        assert_eq!(report.branch_issues[0].severity, Severity::Critical);
    }

    #[test]
    fn test_loop_without_back_edge() {
        let wf = WorkflowDefinition::new("W4", "Loop")
            .with_node(node("Start", "manualTrigger"))
            .with_node(node("Batch", "splitInBatches"))
            .with_node(node("Work", "httpRequest"))
            .with_node(node("After", "noOp"))
            .connect("Start", 0, "Batch")
            .connect("Batch", 1, "Work")
            .connect("Work", 0, "After");
        let report = analyze(&wf);

        assert_eq!(report.loop_issues.len(), 1);
        assert_eq!(report.loop_issues[0].kind, FindingKind::BrokenLoop);
    }

    #[test]
    fn test_loop_without_completion_output() {
        let wf = WorkflowDefinition::new("W5", "Loop")
            .with_node(node("Start", "manualTrigger"))
            .with_node(node("Batch", "splitInBatches"))
            .with_node(node("Work", "httpRequest"))
            .connect("Start", 0, "Batch")
            .connect("Batch", 1, "Work")
            .connect("Work", 0, "Batch");
        let report = analyze(&wf);

        assert_eq!(report.loop_issues.len(), 1);
        assert_eq!(report.loop_issues[0].kind, FindingKind::MissingCompletion);
        assert_eq!(report.loop_issues[0].severity, Severity::Warning);
    }

    #[test]
    fn test_complete_loop_is_clean() {
        let wf = WorkflowDefinition::new("W6", "Loop")
            .with_node(node("Start", "manualTrigger"))
            .with_node(node("Batch", "splitInBatches"))
            .with_node(node("Work", "httpRequest"))
            .with_node(node("Done", "noOp"))
            .connect("Start", 0, "Batch")
            .connect("Batch", 0, "Done")
            .connect("Batch", 1, "Work")
            .connect("Work", 0, "Batch");
        assert!(analyze(&wf).loop_issues.is_empty());
    }

    #[test]
    fn test_ai_sub_nodes_and_annotations_not_orphans() {
        let wf = WorkflowDefinition::new("W7", "Agent")
            .with_node(node("Chat", "chatTrigger"))
            .with_node(NodeDefinition::new("Agent", "@n8n/n8n-nodes-langchain.agent"))
            .with_node(NodeDefinition::new("Model", "@n8n/n8n-nodes-langchain.lmChatOpenAi"))
            .with_node(node("Note", "stickyNote"))
            .connect("Chat", 0, "Agent")
            .connect_channel("ai_languageModel", "Model", 0, "Agent");
        assert!(analyze(&wf).orphaned_nodes.is_empty());
    }

    #[test]
    fn test_disabled_nodes_skipped() {
        let wf = clean_workflow().with_node(node("Old", "merge").disabled());
        assert_eq!(analyze(&wf).integrity_score, 100);
    }

    #[test]
    fn test_code_issues_scored() {
        let wf = clean_workflow().with_node(
            node("Script", "code").with_parameters(json!({ "jsCode": "let x = 1;\nlet x = 2;" })),
        );
        let report = analyze(&wf);

        assert_eq!(report.code_issues.len(), 1);
        assert_eq!(report.code_issues[0].node, "Script");
        assert_eq!(report.code_issues[0].issues[0].line, 2);
        // duplicate declaration 5, plus dead end 15 and orphan 5
        assert_eq!(report.integrity_score, 75);
    }

    #[test]
    fn test_sub_workflow_references_and_unresolved() {
        let wf = clean_workflow()
            .with_node(
                node("Call", "executeWorkflow")
                    .with_parameters(json!({ "workflowId": { "value": "W9", "cachedResultName": "Billing" } })),
            )
            .with_node(node("Broken Call", "executeWorkflow"))
            .connect("Done", 0, "Call")
            .connect("Done", 0, "Broken Call");
        let report = analyze(&wf);

        assert_eq!(report.sub_workflow_references.len(), 1);
        assert_eq!(report.sub_workflow_references[0].workflow_id, "W9");
        assert_eq!(
            report.sub_workflow_references[0].cached_name.as_deref(),
            Some("Billing")
        );
        assert_eq!(
            report.issues,
            vec![DataIssue::UnresolvedSubWorkflowTarget {
                node: "Broken Call".into()
            }]
        );
    }

    #[test]
    fn test_fragment_detection() {
        let wf = WorkflowDefinition::new("", "").with_node(node("Set", "set"));
        let status = analyze(&wf).fragment_status;
        assert!(status.is_fragment);
        assert_eq!(status.missing, vec!["id", "name", "settings"]);
    }

    #[test]
    fn test_report_json_field_names() {
        let json = serde_json::to_value(analyze(&clean_workflow())).unwrap();
        for key in [
            "deadEnds",
            "loopIssues",
            "orphanedNodes",
            "branchIssues",
            "codeIssues",
            "subWorkflowReferences",
            "integrityScore",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
    }
}
