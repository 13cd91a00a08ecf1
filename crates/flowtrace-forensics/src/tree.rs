//! Sub-workflow dependency trees.
//!
//! Starting from one workflow, follows every sub-workflow invoker node to the
//! workflow it calls, recursively. Cycles are cut at the first repeated id on
//! the current path, depth is bounded, and a child that cannot be fetched is
//! kept in the tree with its error instead of aborting the walk.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use flowtrace_types::{NodeKind, SubWorkflowTarget, WorkflowDefinition};

use crate::cache::NameCache;
use crate::error::{ForensicsError, NotFoundKind, Result};
use crate::source::WorkflowSource;

/// Default recursion bound.
pub const DEFAULT_MAX_DEPTH: usize = 12;

/// Default number of sibling workflows fetched at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Tree builder tuning.
#[derive(Debug, Clone)]
pub struct TreeOptions {
    /// Levels below the root that are expanded.
    pub max_depth: usize,
    /// Sibling fetches in flight at once.
    pub concurrency: usize,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// One workflow in a dependency tree.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyTreeNode {
    pub workflow_id: String,
    pub name: String,
    /// `None` when the definition could not be fetched and the name cache
    /// did not know the workflow either.
    pub active: Option<bool>,
    pub node_count: usize,
    /// Invoker node in the parent that called this workflow.
    pub called_via_node_name: Option<String>,
    pub children: Vec<DependencyTreeNode>,
    pub fetch_error: Option<String>,
    /// This id already appears higher up on the same path.
    pub cycle: bool,
    /// Invokers exist below this node but the depth bound stopped the walk.
    pub depth_limited: bool,
    /// Invoker nodes whose target id could not be read from their parameters.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved_invokers: Vec<String>,
}

impl DependencyTreeNode {
    fn fetched(workflow: &WorkflowDefinition, called_via: Option<String>) -> Self {
        Self {
            workflow_id: workflow.id.clone(),
            name: workflow.name.clone(),
            active: Some(workflow.active),
            node_count: workflow.nodes.len(),
            called_via_node_name: called_via,
            children: Vec::new(),
            fetch_error: None,
            cycle: false,
            depth_limited: false,
            unresolved_invokers: Vec::new(),
        }
    }

    fn leaf(workflow_id: String, name: String, active: Option<bool>, called_via: String) -> Self {
        Self {
            workflow_id,
            name,
            active,
            node_count: 0,
            called_via_node_name: Some(called_via),
            children: Vec::new(),
            fetch_error: None,
            cycle: false,
            depth_limited: false,
            unresolved_invokers: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, itself included.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(Self::size).sum::<usize>()
    }

    /// Whether any node in this subtree is a cycle reference.
    pub fn has_cycle(&self) -> bool {
        self.cycle || self.children.iter().any(Self::has_cycle)
    }
}

/// Builds [`DependencyTreeNode`] trees.
pub struct TreeBuilder {
    source: Arc<dyn WorkflowSource>,
    names: Arc<NameCache>,
    options: TreeOptions,
}

impl TreeBuilder {
    pub fn new(source: Arc<dyn WorkflowSource>, names: Arc<NameCache>, options: TreeOptions) -> Self {
        Self {
            source,
            names,
            options,
        }
    }

    /// Build the tree rooted at `root_id`.
    ///
    /// Only the root fetch can fail. Children are fetched with at most
    /// `concurrency` siblings in flight; their order follows the invoker
    /// nodes' order in the parent definition.
    pub async fn build(&self, root_id: &str) -> Result<DependencyTreeNode> {
        let root = self
            .source
            .get_workflow(root_id)
            .await
            .map_err(|e| ForensicsError::from_client(e, NotFoundKind::Workflow, root_id))?;

        let tree = self.expand(root, None, Vec::new(), 0).await;
        info!(
            root = %root_id,
            workflows = tree.size(),
            cycle = tree.has_cycle(),
            "built dependency tree"
        );
        Ok(tree)
    }

    fn expand<'a>(
        &'a self,
        workflow: WorkflowDefinition,
        called_via: Option<String>,
        mut path: Vec<String>,
        depth: usize,
    ) -> BoxFuture<'a, DependencyTreeNode> {
        Box::pin(async move {
            let mut node = DependencyTreeNode::fetched(&workflow, called_via);
            path.push(workflow.id.clone());

            let mut targets = Vec::new();
            for invoker in workflow.nodes_of_kind(NodeKind::SubWorkflow) {
                match invoker.sub_workflow_target() {
                    Some(target) => targets.push((invoker.name.clone(), target)),
                    None => node.unresolved_invokers.push(invoker.name.clone()),
                }
            }

            if targets.is_empty() {
                return node;
            }
            if depth >= self.options.max_depth {
                debug!(workflow = %workflow.id, depth, "depth bound reached");
                node.depth_limited = true;
                return node;
            }

            let path = &path;
            node.children = stream::iter(targets)
                .map(|(via, target)| self.child(via, target, path, depth + 1))
                .buffered(self.options.concurrency.max(1))
                .collect()
                .await;
            node
        })
    }

    async fn child(
        &self,
        via: String,
        target: SubWorkflowTarget,
        path: &[String],
        depth: usize,
    ) -> DependencyTreeNode {
        let id = target.workflow_id.clone();

        if path.contains(&id) {
            debug!(workflow = %id, via = %via, "cycle reference");
            let (name, active) = self.label(&target).await;
            let mut node = DependencyTreeNode::leaf(id, name, active, via);
            node.cycle = true;
            return node;
        }

        match self.source.get_workflow(&id).await {
            Ok(workflow) => self.expand(workflow, Some(via), path.to_vec(), depth).await,
            Err(e) => {
                warn!(workflow = %id, error = %e, "sub-workflow fetch failed");
                let (name, active) = self.label(&target).await;
                let mut node = DependencyTreeNode::leaf(id, name, active, via);
                node.fetch_error = Some(e.to_string());
                node
            }
        }
    }

    /// Best available name for a workflow that was not fetched.
    async fn label(&self, target: &SubWorkflowTarget) -> (String, Option<bool>) {
        let label = self.names.resolve(&target.workflow_id).await;
        match (&target.cached_name, label.is_known()) {
            (Some(hint), false) => (hint.clone(), None),
            _ => (label.name, label.active),
        }
    }
}
