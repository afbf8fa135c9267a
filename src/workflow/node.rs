//! Workflow nodes, their transforms, and the context transforms see.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::directive::{missing_content, NodeDirective};
use crate::error::SwarmError;
use crate::result::ExecutionResult;

/// Decides a node's input, or redirects control flow.
pub type InputTransform = Arc<dyn Fn(&NodeContext) -> Result<NodeDirective, SwarmError> + Send + Sync>;

/// Rewrites a node's result content before dependents see it.
pub type OutputTransform = Arc<dyn Fn(&ExecutionResult) -> Result<String, SwarmError> + Send + Sync>;

fn default_true() -> bool {
    true
}

/// An agent taking part in a node, with the delegates wired for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAgent {
    pub agent: String,
    #[serde(default)]
    pub delegates_to: Vec<String>,
    /// Start from a fresh session in this node instead of the workflow-wide one.
    #[serde(default = "default_true")]
    pub reset_context: bool,
}

impl NodeAgent {
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            delegates_to: Vec::new(),
            reset_context: true,
        }
    }

    pub fn delegates_to<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.delegates_to = targets.into_iter().map(Into::into).collect();
        self
    }

    /// Keep this agent's conversation across nodes in one workflow.
    pub fn keep_context(mut self) -> Self {
        self.reset_context = false;
        self
    }
}

/// A named stage of a workflow.
#[derive(Clone)]
pub struct WorkflowNode {
    pub id: String,
    pub depends_on: Vec<String>,
    pub agents: Vec<NodeAgent>,
    /// Defaults to the first declared agent.
    pub lead: Option<String>,
    pub input: Option<InputTransform>,
    pub output: Option<OutputTransform>,
}

impl WorkflowNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            depends_on: Vec::new(),
            agents: Vec::new(),
            lead: None,
            input: None,
            output: None,
        }
    }

    pub fn depends_on<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(nodes.into_iter().map(Into::into));
        self
    }

    pub fn agent(self, agent: impl Into<String>) -> Self {
        self.with_agent(NodeAgent::new(agent))
    }

    pub fn with_agent(mut self, agent: NodeAgent) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn lead(mut self, agent: impl Into<String>) -> Self {
        self.lead = Some(agent.into());
        self
    }

    pub fn input<F>(mut self, transform: F) -> Self
    where
        F: Fn(&NodeContext) -> Result<NodeDirective, SwarmError> + Send + Sync + 'static,
    {
        self.input = Some(Arc::new(transform));
        self
    }

    pub fn output<F>(mut self, transform: F) -> Self
    where
        F: Fn(&ExecutionResult) -> Result<String, SwarmError> + Send + Sync + 'static,
    {
        self.output = Some(Arc::new(transform));
        self
    }

    /// Agent that receives the node's input.
    pub fn lead_agent(&self) -> Option<&str> {
        self.lead
            .as_deref()
            .or_else(|| self.agents.first().map(|agent| agent.agent.as_str()))
    }

    pub fn has_transform(&self) -> bool {
        self.input.is_some() || self.output.is_some()
    }
}

impl std::fmt::Debug for WorkflowNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowNode")
            .field("id", &self.id)
            .field("depends_on", &self.depends_on)
            .field("agents", &self.agents)
            .field("lead", &self.lead)
            .field("input", &self.input.is_some())
            .field("output", &self.output.is_some())
            .finish()
    }
}

/// What an input transform can see.
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub node: String,
    pub original_prompt: String,
    pub dependencies: Vec<String>,
    /// Result of the node that ran immediately before this one.
    pub previous: Option<ExecutionResult>,
    /// Every result produced so far in this run.
    pub results: BTreeMap<String, ExecutionResult>,
}

impl NodeContext {
    /// Default input: the preceding result's content, or the original
    /// prompt for the first node.
    pub fn content(&self) -> &str {
        self.previous
            .as_ref()
            .map(|result| result.content.as_str())
            .unwrap_or(&self.original_prompt)
    }

    pub fn result(&self, node: &str) -> Option<&ExecutionResult> {
        self.results.get(node)
    }

    pub fn pass_through(&self) -> NodeDirective {
        NodeDirective::Continue(self.content().to_string())
    }

    pub fn skip_execution(&self, content: Option<String>) -> Result<NodeDirective, SwarmError> {
        content
            .map(NodeDirective::Skip)
            .ok_or_else(|| missing_content(&self.node, "skip_execution"))
    }

    pub fn halt_workflow(&self, content: Option<String>) -> Result<NodeDirective, SwarmError> {
        content
            .map(NodeDirective::Halt)
            .ok_or_else(|| missing_content(&self.node, "halt_workflow"))
    }

    pub fn goto_node(&self, target: impl Into<String>, content: Option<String>) -> Result<NodeDirective, SwarmError> {
        let node = target.into();
        content
            .map(|content| NodeDirective::Goto { node, content })
            .ok_or_else(|| missing_content(&self.node, "goto_node"))
    }
}
