//! Workflow definitions: nodes, their kinds, and the connections between them.

use serde::Serialize;
use serde_json::{Map, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Node kinds
// ─────────────────────────────────────────────────────────────────────────────

/// Closed classification of a node's raw type tag.
///
/// Every analysis matches on this exhaustively. Types nobody has taught the
/// classifier about land in [`NodeKind::Generic`] and keep their raw tag on
/// the [`NodeDefinition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Starts an execution (schedules, webhooks, sub-workflow entry points).
    Trigger,
    /// Runs embedded script text.
    Script,
    /// Routes items to one of several outputs (if, switch, filter).
    Branch,
    /// Batches items and loops back on itself.
    Loop,
    /// Joins several inputs.
    Merge,
    /// Invokes another workflow as a nested step.
    SubWorkflow,
    /// Anything else.
    Generic,
}

impl NodeKind {
    /// Classify a raw type tag such as `n8n-nodes-base.splitInBatches`.
    pub fn classify(type_tag: &str) -> Self {
        let suffix = type_suffix(type_tag).to_ascii_lowercase();

        if suffix.contains("trigger") || suffix == "webhook" {
            return NodeKind::Trigger;
        }

        match suffix.as_str() {
            "code" | "function" | "functionitem" => NodeKind::Script,
            "executeworkflow" => NodeKind::SubWorkflow,
            "if" | "switch" | "filter" => NodeKind::Branch,
            "splitinbatches" => NodeKind::Loop,
            "merge" => NodeKind::Merge,
            _ => NodeKind::Generic,
        }
    }

    /// Short label used in human-readable output.
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Trigger => "trigger",
            NodeKind::Script => "script",
            NodeKind::Branch => "branch",
            NodeKind::Loop => "loop",
            NodeKind::Merge => "merge",
            NodeKind::SubWorkflow => "sub-workflow",
            NodeKind::Generic => "generic",
        }
    }
}

/// Last dotted segment of a type tag (`n8n-nodes-base.code` → `code`).
pub fn type_suffix(type_tag: &str) -> &str {
    type_tag.rsplit('.').next().unwrap_or(type_tag)
}

// ─────────────────────────────────────────────────────────────────────────────
// Nodes
// ─────────────────────────────────────────────────────────────────────────────

/// Parameter keys that hold embedded script text, in lookup order.
const SCRIPT_PARAMETERS: &[&str] = &["jsCode", "functionCode", "pythonCode"];

/// A single step in a workflow.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefinition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Unique within the owning workflow.
    pub name: String,
    /// Raw type tag as reported by the server.
    #[serde(rename = "type")]
    pub type_tag: String,
    pub kind: NodeKind,
    /// Arbitrary nested parameter tree.
    pub parameters: Value,
    pub disabled: bool,
}

/// Where a sub-workflow invoker points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubWorkflowTarget {
    pub workflow_id: String,
    /// Name the editor cached alongside the id, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_name: Option<String>,
}

impl NodeDefinition {
    /// Create an enabled node with empty parameters.
    pub fn new(name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        let type_tag = type_tag.into();
        Self {
            id: None,
            name: name.into(),
            kind: NodeKind::classify(&type_tag),
            type_tag,
            parameters: Value::Object(Map::new()),
            disabled: false,
        }
    }

    /// Replace the parameter tree.
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Mark the node disabled.
    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Last segment of the type tag, lowercased.
    pub fn type_suffix(&self) -> String {
        type_suffix(&self.type_tag).to_ascii_lowercase()
    }

    /// Embedded script text for script nodes.
    pub fn script_text(&self) -> Option<&str> {
        if self.kind != NodeKind::Script {
            return None;
        }
        SCRIPT_PARAMETERS
            .iter()
            .find_map(|key| self.parameters.get(*key).and_then(Value::as_str))
    }

    /// Target workflow of a sub-workflow invoker.
    ///
    /// Accepts both a plain string id and a resource-locator object
    /// (`{ "value": "...", "cachedResultName": "..." }`). Returns `None` when
    /// the node is not an invoker or the id cannot be resolved.
    pub fn sub_workflow_target(&self) -> Option<SubWorkflowTarget> {
        if self.kind != NodeKind::SubWorkflow {
            return None;
        }

        match self.parameters.get("workflowId")? {
            Value::String(id) if !id.trim().is_empty() => Some(SubWorkflowTarget {
                workflow_id: id.trim().to_string(),
                cached_name: None,
            }),
            Value::Number(n) => Some(SubWorkflowTarget {
                workflow_id: n.to_string(),
                cached_name: None,
            }),
            Value::Object(locator) => {
                let workflow_id = match locator.get("value")? {
                    Value::String(id) if !id.trim().is_empty() => id.trim().to_string(),
                    Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                let cached_name = locator
                    .get("cachedResultName")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Some(SubWorkflowTarget {
                    workflow_id,
                    cached_name,
                })
            }
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connections
// ─────────────────────────────────────────────────────────────────────────────

/// Channel name of ordinary item-carrying connections.
pub const MAIN_CHANNEL: &str = "main";

/// A directed edge from one node's output slot to another node's input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub source_node: String,
    pub source_slot: usize,
    pub target_node: String,
    pub target_slot: usize,
    /// `main` for item flow; other channels attach helper nodes (models,
    /// tools, memories) to the node that consumes them.
    pub channel: String,
}

impl Connection {
    /// Whether this edge carries items.
    pub fn is_main(&self) -> bool {
        self.channel == MAIN_CHANNEL
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Workflows
// ─────────────────────────────────────────────────────────────────────────────

/// A workflow definition as fetched from the server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub nodes: Vec<NodeDefinition>,
    pub connections: Vec<Connection>,
    pub settings: Map<String, Value>,
}

impl WorkflowDefinition {
    /// Create an empty, inactive workflow.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            active: false,
            nodes: Vec::new(),
            connections: Vec::new(),
            settings: Map::new(),
        }
    }

    /// Set the active flag.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Append a node.
    pub fn with_node(mut self, node: NodeDefinition) -> Self {
        self.nodes.push(node);
        self
    }

    /// Append a `main` connection from `source`'s output `slot` to `target`.
    pub fn connect(self, source: &str, slot: usize, target: &str) -> Self {
        self.connect_channel(MAIN_CHANNEL, source, slot, target)
    }

    /// Append a connection on an arbitrary channel.
    pub fn connect_channel(mut self, channel: &str, source: &str, slot: usize, target: &str) -> Self {
        self.connections.push(Connection {
            source_node: source.to_string(),
            source_slot: slot,
            target_node: target.to_string(),
            target_slot: 0,
            channel: channel.to_string(),
        });
        self
    }

    /// Look up a node by name.
    pub fn node(&self, name: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Connections leaving `name`.
    pub fn outgoing<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.source_node == name)
    }

    /// Connections arriving at `name`.
    pub fn incoming<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.target_node == name)
    }

    /// Nodes of the given kind, in definition order.
    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &NodeDefinition> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    /// Node names, in definition order.
    pub fn node_names(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_node_kinds() {
        assert_eq!(NodeKind::classify("n8n-nodes-base.code"), NodeKind::Script);
        assert_eq!(NodeKind::classify("n8n-nodes-base.functionItem"), NodeKind::Script);
        assert_eq!(NodeKind::classify("n8n-nodes-base.if"), NodeKind::Branch);
        assert_eq!(NodeKind::classify("n8n-nodes-base.switch"), NodeKind::Branch);
        assert_eq!(NodeKind::classify("n8n-nodes-base.splitInBatches"), NodeKind::Loop);
        assert_eq!(NodeKind::classify("n8n-nodes-base.merge"), NodeKind::Merge);
        assert_eq!(
            NodeKind::classify("n8n-nodes-base.executeWorkflow"),
            NodeKind::SubWorkflow
        );
        assert_eq!(NodeKind::classify("n8n-nodes-base.webhook"), NodeKind::Trigger);
        assert_eq!(
            NodeKind::classify("n8n-nodes-base.scheduleTrigger"),
            NodeKind::Trigger
        );
        assert_eq!(NodeKind::classify("n8n-nodes-base.httpRequest"), NodeKind::Generic);
    }

    #[test]
    fn test_execute_workflow_trigger_is_a_trigger() {
        assert_eq!(
            NodeKind::classify("n8n-nodes-base.executeWorkflowTrigger"),
            NodeKind::Trigger
        );
    }

    #[test]
    fn test_respond_to_webhook_is_not_a_trigger() {
        assert_eq!(
            NodeKind::classify("n8n-nodes-base.respondToWebhook"),
            NodeKind::Generic
        );
    }

    #[test]
    fn test_script_text_lookup() {
        let node = NodeDefinition::new("Transform", "n8n-nodes-base.code")
            .with_parameters(json!({ "jsCode": "return items;" }));
        assert_eq!(node.script_text(), Some("return items;"));

        let legacy = NodeDefinition::new("Legacy", "n8n-nodes-base.function")
            .with_parameters(json!({ "functionCode": "return [];" }));
        assert_eq!(legacy.script_text(), Some("return [];"));

        let http = NodeDefinition::new("Fetch", "n8n-nodes-base.httpRequest")
            .with_parameters(json!({ "jsCode": "ignored" }));
        assert_eq!(http.script_text(), None);
    }

    #[test]
    fn test_sub_workflow_target_plain_string() {
        let node = NodeDefinition::new("Call", "n8n-nodes-base.executeWorkflow")
            .with_parameters(json!({ "workflowId": "abc123" }));
        let target = node.sub_workflow_target().unwrap();
        assert_eq!(target.workflow_id, "abc123");
        assert_eq!(target.cached_name, None);
    }

    #[test]
    fn test_sub_workflow_target_resource_locator() {
        let node = NodeDefinition::new("Call", "n8n-nodes-base.executeWorkflow").with_parameters(
            json!({
                "workflowId": {
                    "__rl": true,
                    "mode": "list",
                    "value": "W2",
                    "cachedResultName": "Enrich contact"
                }
            }),
        );
        let target = node.sub_workflow_target().unwrap();
        assert_eq!(target.workflow_id, "W2");
        assert_eq!(target.cached_name.as_deref(), Some("Enrich contact"));
    }

    #[test]
    fn test_sub_workflow_target_unresolvable() {
        let empty = NodeDefinition::new("Call", "n8n-nodes-base.executeWorkflow")
            .with_parameters(json!({ "workflowId": { "value": "" } }));
        assert!(empty.sub_workflow_target().is_none());

        let missing = NodeDefinition::new("Call", "n8n-nodes-base.executeWorkflow");
        assert!(missing.sub_workflow_target().is_none());
    }

    #[test]
    fn test_incoming_and_outgoing() {
        let wf = WorkflowDefinition::new("W1", "Test")
            .with_node(NodeDefinition::new("Start", "n8n-nodes-base.manualTrigger"))
            .with_node(NodeDefinition::new("Check", "n8n-nodes-base.if"))
            .with_node(NodeDefinition::new("Yes", "n8n-nodes-base.set"))
            .connect("Start", 0, "Check")
            .connect("Check", 0, "Yes");

        assert_eq!(wf.outgoing("Check").count(), 1);
        assert_eq!(wf.incoming("Check").count(), 1);
        assert_eq!(wf.incoming("Start").count(), 0);
        assert_eq!(wf.nodes_of_kind(NodeKind::Branch).count(), 1);
    }
}
