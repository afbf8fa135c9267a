//! Node workflows: a validated DAG of agent-backed or transform-only
//! stages executed in dependency order.

pub mod directive;
pub mod graph;
pub mod node;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub use directive::NodeDirective;
pub use graph::DependencyGraph;
pub use node::{InputTransform, NodeAgent, NodeContext, OutputTransform, WorkflowNode};

use crate::agent::{build_toolset, AgentDefinition, AgentSession, SessionEnv, SessionHandle};
use crate::config::OrchestrationConfig;
use crate::error::{ErrorCategory, SwarmError, TimeoutScope};
use crate::events::{self, EventCallback, EventKind, EventLog, EventOrigin, OrchestrationEvent};
use crate::read_tracking::ReadTracking;
use crate::registry::Registry;
use crate::result::ExecutionResult;
use crate::scratchpad::Scratchpad;
use crate::swarm::{parse_instance_key, SessionStore, Swarm, SwarmDefinition};
use crate::util::timeout::with_timeout;

/// Outcome of one workflow run.
#[derive(Debug, Clone, Default)]
pub struct WorkflowRun {
    /// Latest result of every node that ran, by node id.
    pub results: BTreeMap<String, ExecutionResult>,
    /// Node ids in the order they ran, repeats included.
    pub execution_order: Vec<String>,
    /// Halt content, or the content of the last node that ran.
    pub output: Option<String>,
    pub halted_at: Option<String>,
    /// Set when a terminal transport error or the run timeout ended the run.
    pub error: Option<String>,
    pub duration: Duration,
    pub logs: Vec<OrchestrationEvent>,
}

impl WorkflowRun {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    pub fn halted(&self) -> bool {
        self.halted_at.is_some()
    }

    pub fn result(&self, node: &str) -> Option<&ExecutionResult> {
        self.results.get(node)
    }

    pub fn total_tokens(&self) -> u64 {
        self.results.values().map(ExecutionResult::total_tokens).sum()
    }

    pub fn total_cost(&self) -> f64 {
        self.results.values().map(ExecutionResult::total_cost).sum()
    }
}

#[derive(Default)]
struct RunState {
    results: BTreeMap<String, ExecutionResult>,
    execution_order: Vec<String>,
    output: Option<String>,
    halted_at: Option<String>,
    executions: usize,
    /// Nodes this run may execute: the start node's subgraph plus goto targets'.
    scheduled: BTreeSet<String>,
}

impl RunState {
    fn record(&mut self, node: &str, result: ExecutionResult) {
        self.execution_order.push(node.to_string());
        self.results.insert(node.to_string(), result);
    }
}

enum NodeStep {
    Done(ExecutionResult),
    Halted(ExecutionResult),
    Redirect {
        result: ExecutionResult,
        target: String,
        content: String,
    },
    Terminal(ExecutionResult, SwarmError),
}

impl NodeStep {
    fn result(&self) -> &ExecutionResult {
        match self {
            Self::Done(result)
            | Self::Halted(result)
            | Self::Redirect { result, .. }
            | Self::Terminal(result, _) => result,
        }
    }

    fn map_result(self, f: impl FnOnce(ExecutionResult) -> ExecutionResult) -> Self {
        match self {
            Self::Done(result) => Self::Done(f(result)),
            Self::Halted(result) => Self::Halted(f(result)),
            Self::Redirect {
                result,
                target,
                content,
            } => Self::Redirect {
                result: f(result),
                target,
                content,
            },
            Self::Terminal(result, err) => Self::Terminal(f(result), err),
        }
    }
}

/// Builder for [`Workflow`]; every graph-shape check runs in `build`.
pub struct WorkflowBuilder {
    name: String,
    registry: Registry,
    config: Arc<OrchestrationConfig>,
    agents: Vec<AgentDefinition>,
    nodes: Vec<WorkflowNode>,
    start: Option<String>,
    scratchpad: Scratchpad,
    read_tracking: ReadTracking,
}

impl WorkflowBuilder {
    pub fn config(mut self, config: OrchestrationConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn agent(mut self, definition: AgentDefinition) -> Self {
        self.agents.push(definition);
        self
    }

    pub fn agents(mut self, definitions: impl IntoIterator<Item = AgentDefinition>) -> Self {
        self.agents.extend(definitions);
        self
    }

    pub fn node(mut self, node: WorkflowNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Defaults to the first declared node.
    pub fn start(mut self, node: impl Into<String>) -> Self {
        self.start = Some(node.into());
        self
    }

    pub fn scratchpad(mut self, scratchpad: Scratchpad) -> Self {
        self.scratchpad = scratchpad;
        self
    }

    pub fn read_tracking(mut self, read_tracking: ReadTracking) -> Self {
        self.read_tracking = read_tracking;
        self
    }

    pub fn build(self) -> Result<Workflow, SwarmError> {
        let mut agents = BTreeMap::new();
        for agent in self.agents {
            let name = agent.name.clone();
            if agents.insert(name.clone(), Arc::new(agent)).is_some() {
                return Err(SwarmError::config(format!("agent '{name}' is defined twice")));
            }
        }

        let mut nodes = BTreeMap::new();
        for node in &self.nodes {
            if node.id.is_empty() || node.id.contains(['@', '/']) {
                return Err(SwarmError::config(format!(
                    "invalid node id '{}': must be non-empty and contain no '@' or '/'",
                    node.id
                )));
            }
            if nodes.insert(node.id.clone(), node.clone()).is_some() {
                return Err(SwarmError::config(format!("node '{}' is defined twice", node.id)));
            }
        }
        let start = self
            .start
            .or_else(|| self.nodes.first().map(|node| node.id.clone()))
            .ok_or_else(|| SwarmError::config(format!("workflow '{}' has no nodes", self.name)))?;
        if !nodes.contains_key(&start) {
            return Err(SwarmError::config(format!("start node '{start}' is not defined")));
        }

        let graph = DependencyGraph::new(
            self.nodes
                .iter()
                .map(|node| (node.id.as_str(), node.depends_on.as_slice())),
        );
        graph.validate()?;

        for node in &self.nodes {
            if node.agents.is_empty() {
                if !node.has_transform() {
                    return Err(SwarmError::config(format!(
                        "node '{}' has neither agents nor a transform",
                        node.id
                    )));
                }
                continue;
            }
            let definition = node_definition(&agents, node)?;
            definition
                .validate()
                .and_then(|_| definition.check_registry(&self.registry))
                .map_err(|err| SwarmError::config(format!("node '{}': {err}", node.id)))?;
        }

        let reachable = graph.reachable_from(&start);
        for id in &reachable {
            if let Some(dep) = graph.dependencies(id).iter().find(|dep| !reachable.contains(*dep)) {
                return Err(SwarmError::config(format!(
                    "node '{id}' depends on '{dep}', which never runs from start node '{start}'"
                )));
            }
        }

        tracing::debug!(workflow = %self.name, start = %start, nodes = nodes.len(), "Workflow built");
        Ok(Workflow {
            inner: Arc::new(WorkflowInner {
                name: self.name,
                start,
                nodes,
                graph,
                agents,
                env: SessionEnv {
                    registry: self.registry,
                    config: self.config,
                    read_tracking: self.read_tracking,
                    scratchpad: self.scratchpad,
                },
                store: SessionStore::new(),
                callbacks: Mutex::default(),
            }),
        })
    }
}

/// Swarm shape for one node: node agents are top-level with their node
/// delegates; delegate-only agents are plain instances.
fn node_definition(
    agents: &BTreeMap<String, Arc<AgentDefinition>>,
    node: &WorkflowNode,
) -> Result<SwarmDefinition, SwarmError> {
    let lead = node
        .lead_agent()
        .ok_or_else(|| SwarmError::config(format!("node '{}' has no agents", node.id)))?;
    if !node.agents.iter().any(|agent| agent.agent == lead) {
        return Err(SwarmError::config(format!(
            "node '{}': lead '{lead}' is not one of the node's agents",
            node.id
        )));
    }
    let declared = |name: &str| {
        agents.get(name).ok_or_else(|| {
            SwarmError::config(format!(
                "node '{}' references undeclared agent '{name}'",
                node.id
            ))
        })
    };

    let mut seen = BTreeSet::new();
    let mut definitions = Vec::new();
    for pair in &node.agents {
        if !seen.insert(pair.agent.clone()) {
            continue;
        }
        let mut definition = AgentDefinition::clone(declared(&pair.agent)?);
        definition.delegates_to = pair.delegates_to.clone();
        definition.shared_across_delegations = true;
        definitions.push(definition);
    }
    for target in node.agents.iter().flat_map(|pair| pair.delegates_to.iter()) {
        if !seen.insert(target.clone()) {
            continue;
        }
        let mut definition = AgentDefinition::clone(declared(target)?);
        definition.delegates_to.clear();
        definition.shared_across_delegations = false;
        definitions.push(definition);
    }
    Ok(SwarmDefinition::new(lead, definitions).with_name(node.id.clone()))
}

struct WorkflowInner {
    name: String,
    start: String,
    nodes: BTreeMap<String, WorkflowNode>,
    graph: DependencyGraph,
    agents: BTreeMap<String, Arc<AgentDefinition>>,
    env: SessionEnv,
    store: SessionStore,
    callbacks: Mutex<Vec<EventCallback>>,
}

/// A validated workflow; clones share sessions and scratch state.
#[derive(Clone)]
pub struct Workflow {
    inner: Arc<WorkflowInner>,
}

impl Workflow {
    pub fn builder(name: impl Into<String>, registry: Registry) -> WorkflowBuilder {
        WorkflowBuilder {
            name: name.into(),
            registry,
            config: Arc::new(OrchestrationConfig::default()),
            agents: Vec::new(),
            nodes: Vec::new(),
            start: None,
            scratchpad: Scratchpad::new(),
            read_tracking: ReadTracking::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn start_node(&self) -> &str {
        &self.inner.start
    }

    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.inner.nodes.get(id)
    }

    pub fn scratchpad(&self) -> &Scratchpad {
        &self.inner.env.scratchpad
    }

    pub fn read_tracking(&self) -> &ReadTracking {
        &self.inner.env.read_tracking
    }

    pub fn on_event(&self, callback: impl Fn(&OrchestrationEvent) + Send + Sync + 'static) {
        self.inner.callbacks.lock().push(Arc::new(callback));
    }

    /// Whether some node keeps `agent`'s conversation across nodes.
    pub fn is_persistent_agent(&self, agent: &str) -> bool {
        self.inner
            .nodes
            .values()
            .flat_map(|node| node.agents.iter())
            .any(|pair| pair.agent == agent && !pair.reset_context)
    }

    /// Workflow-wide sessions materialized so far.
    pub fn persistent_sessions(&self) -> Vec<SessionHandle> {
        self.inner.store.sessions()
    }

    /// Workflow-wide session of `agent`, created on first access.
    pub fn persistent_session(&self, agent: &str) -> Result<SessionHandle, SwarmError> {
        if !self.is_persistent_agent(agent) {
            return Err(SwarmError::InvalidArgument(format!(
                "agent '{agent}' does not keep context in workflow '{}'",
                self.inner.name
            )));
        }
        if let Some(handle) = self.inner.store.get(agent) {
            return Ok(handle);
        }
        let definition = self
            .inner
            .agents
            .get(agent)
            .cloned()
            .ok_or_else(|| SwarmError::InvalidArgument(format!("agent '{agent}' is not declared")))?;
        let tools = build_toolset(&definition, &self.inner.env.registry)?;
        let handle = SessionHandle::new(AgentSession::new(agent, definition, tools, self.inner.env.clone()));
        Ok(self.inner.store.insert_if_absent(agent, handle))
    }

    /// Whether node `node` can create session `key`: one of its agents, or
    /// a `delegate@caller` instance its agents delegate to.
    pub fn has_node_session(&self, node: &str, key: &str) -> bool {
        let Some(node) = self.inner.nodes.get(node) else {
            return false;
        };
        match parse_instance_key(key) {
            Some((delegate, caller)) => node
                .agents
                .iter()
                .any(|pair| pair.agent == caller && pair.delegates_to.iter().any(|target| target == delegate)),
            None => node.agents.iter().any(|pair| pair.agent == key),
        }
    }

    fn origin(&self, node: Option<&str>) -> EventOrigin {
        EventOrigin {
            swarm_id: Some(self.inner.name.clone()),
            parent_swarm_id: None,
            node: node.map(str::to_string),
        }
    }

    /// Run from the start node.
    pub async fn execute(&self, prompt: &str) -> Result<WorkflowRun, SwarmError> {
        let start = self.inner.start.clone();
        self.execute_from(&start, prompt).await
    }

    /// Run from `start` and every node depending on it.
    ///
    /// Node failures are captured in their results. Only configuration
    /// errors surfacing at run time (malformed directives, unknown goto
    /// targets, the node-execution limit) are returned as `Err`.
    pub async fn execute_from(&self, start: &str, prompt: &str) -> Result<WorkflowRun, SwarmError> {
        if !self.inner.graph.contains(start) {
            return Err(SwarmError::config(format!("start node '{start}' is not defined")));
        }
        let log = EventLog::new();
        let mut callbacks = self.inner.callbacks.lock().clone();
        callbacks.push(log.callback());
        let state = Mutex::new(RunState::default());
        let origin = self.origin(None);
        let started = Instant::now();

        let outcome = events::scope(callbacks, async {
            tracing::debug!(workflow = %self.inner.name, start = %start, "Workflow run started");
            origin.emit(
                EventKind::WorkflowStart {
                    prompt: prompt.to_string(),
                    start_node: start.to_string(),
                },
                None,
            );
            let timeout = self.inner.env.config.run_timeout();
            let outcome = with_timeout(TimeoutScope::Run, timeout, self.run_nodes(start, prompt, &state)).await;
            if let Err(SwarmError::Timeout {
                scope: TimeoutScope::Run,
                after_ms,
            }) = &outcome
            {
                tracing::warn!(workflow = %self.inner.name, after_ms, "Workflow run timed out");
                origin.emit(
                    EventKind::Timeout {
                        scope: TimeoutScope::Run,
                        after_ms: *after_ms,
                    },
                    None,
                );
            }
            origin.emit(
                EventKind::WorkflowStop {
                    success: outcome.is_ok(),
                    halted_at: state.lock().halted_at.clone(),
                },
                None,
            );
            outcome
        })
        .await;

        let error = match outcome {
            Ok(()) => None,
            Err(err) if err.category() == ErrorCategory::Configuration => return Err(err),
            Err(err) => {
                tracing::warn!(workflow = %self.inner.name, error = %err, "Workflow run ended early");
                Some(err.to_string())
            }
        };
        let state = state.into_inner();
        Ok(WorkflowRun {
            results: state.results,
            execution_order: state.execution_order,
            output: state.output,
            halted_at: state.halted_at,
            error,
            duration: started.elapsed(),
            logs: log.take(),
        })
    }

    async fn run_nodes(&self, start: &str, prompt: &str, state: &Mutex<RunState>) -> Result<(), SwarmError> {
        let max_executions = self.inner.env.config.max_node_executions;
        let mut queue: VecDeque<String> = self.inner.graph.execution_order(start).into();
        state.lock().scheduled.extend(queue.iter().cloned());
        let mut redirect: Option<(String, String)> = None;
        let mut previous: Option<ExecutionResult> = None;

        while let Some(node_id) = queue.pop_front() {
            {
                let mut state = state.lock();
                state.executions += 1;
                if state.executions > max_executions {
                    return Err(SwarmError::config(format!(
                        "workflow '{}' exceeded {max_executions} node executions",
                        self.inner.name
                    )));
                }
            }
            let node = self
                .inner
                .nodes
                .get(&node_id)
                .ok_or_else(|| SwarmError::config(format!("node '{node_id}' is not defined")))?;
            let goto_input = match redirect.take() {
                Some((target, content)) if target == node_id => Some(content),
                other => {
                    redirect = other;
                    None
                }
            };

            let step = Box::pin(self.run_node(node, prompt, previous.clone(), goto_input, state));
            match step.await? {
                NodeStep::Done(result) => {
                    previous = Some(result.clone());
                    state.lock().record(&node_id, result);
                }
                NodeStep::Halted(result) => {
                    let mut state = state.lock();
                    state.output = Some(result.content.clone());
                    state.halted_at = Some(node_id.clone());
                    state.record(&node_id, result);
                    return Ok(());
                }
                NodeStep::Redirect {
                    result,
                    target,
                    content,
                } => {
                    if !self.inner.graph.contains(&target) {
                        return Err(SwarmError::config(format!(
                            "node '{node_id}': goto_node target '{target}' is not defined"
                        )));
                    }
                    previous = Some(result.clone());
                    state.lock().record(&node_id, result);
                    queue = self.inner.graph.execution_order(&target).into();
                    state.lock().scheduled.extend(queue.iter().cloned());
                    redirect = Some((target, content));
                }
                NodeStep::Terminal(result, err) => {
                    state.lock().record(&node_id, result);
                    return Err(err);
                }
            }
        }

        state.lock().output = previous.map(|result| result.content);
        Ok(())
    }

    async fn run_node(
        &self,
        node: &WorkflowNode,
        prompt: &str,
        previous: Option<ExecutionResult>,
        goto_input: Option<String>,
        state: &Mutex<RunState>,
    ) -> Result<NodeStep, SwarmError> {
        let origin = self.origin(Some(&node.id));
        let log = EventLog::new();
        let started = Instant::now();

        let step = events::scope(vec![log.callback()], async {
            origin.emit(
                EventKind::NodeStart {
                    dependencies: node.depends_on.clone(),
                },
                node.lead_agent(),
            );
            let step = self
                .node_step(node, prompt, previous, goto_input, state, &origin)
                .await?;
            let result = step.result();
            tracing::debug!(
                node = %node.id,
                skipped = result.skipped,
                success = result.success(),
                "Node finished"
            );
            origin.emit(
                EventKind::NodeStop {
                    skipped: result.skipped,
                    success: result.success(),
                    duration_ms: started.elapsed().as_millis() as u64,
                },
                node.lead_agent(),
            );
            Ok::<_, SwarmError>(step)
        })
        .await?;

        Ok(step.map_result(|result| result.with_duration(started.elapsed()).with_logs(log.take())))
    }

    async fn node_step(
        &self,
        node: &WorkflowNode,
        prompt: &str,
        previous: Option<ExecutionResult>,
        goto_input: Option<String>,
        state: &Mutex<RunState>,
        origin: &EventOrigin,
    ) -> Result<NodeStep, SwarmError> {
        let (results, scheduled) = {
            let state = state.lock();
            (state.results.clone(), state.scheduled.clone())
        };

        let directive = match goto_input {
            // a goto target takes the carried content and bypasses its input transform
            Some(content) => NodeDirective::Continue(content),
            None => {
                for dep in &node.depends_on {
                    let failure = match results.get(dep) {
                        Some(result) if result.success() => continue,
                        Some(_) => format!("dependency '{dep}' failed"),
                        // upstream of the node this run started from
                        None if !scheduled.contains(dep) => continue,
                        None => format!("dependency '{dep}' produced no result"),
                    };
                    tracing::warn!(node = %node.id, dependency = %dep, "Node not executed: {failure}");
                    return Ok(NodeStep::Done(ExecutionResult::failure(
                        &SwarmError::InvalidState(failure),
                        None,
                    )));
                }
                let ctx = NodeContext {
                    node: node.id.clone(),
                    original_prompt: prompt.to_string(),
                    dependencies: node.depends_on.clone(),
                    previous,
                    results,
                };
                match &node.input {
                    Some(transform) => match transform(&ctx) {
                        Ok(directive) => directive,
                        Err(err) if err.category() == ErrorCategory::Configuration => return Err(err),
                        Err(err) => {
                            tracing::warn!(node = %node.id, error = %err, "Input transform failed");
                            return Ok(NodeStep::Done(ExecutionResult::failure(&err, None)));
                        }
                    },
                    None => ctx.pass_through(),
                }
            }
        };

        match directive {
            NodeDirective::Continue(input) => self.run_body(node, input).await,
            NodeDirective::Skip(content) => {
                tracing::debug!(node = %node.id, "Node skipped by input transform");
                Ok(NodeStep::Done(ExecutionResult::skipped(content)))
            }
            NodeDirective::Halt(content) => {
                tracing::debug!(node = %node.id, "Workflow halted by input transform");
                origin.emit(
                    EventKind::WorkflowHalted {
                        content: content.clone(),
                    },
                    None,
                );
                let mut result = ExecutionResult::completed(content, None);
                result.halted = true;
                Ok(NodeStep::Halted(result))
            }
            NodeDirective::Goto {
                node: target,
                content,
            } => {
                tracing::debug!(node = %node.id, target = %target, "Node redirected");
                origin.emit(
                    EventKind::NodeRedirected {
                        target: target.clone(),
                    },
                    None,
                );
                Ok(NodeStep::Redirect {
                    result: ExecutionResult::skipped(content.clone()),
                    target,
                    content,
                })
            }
        }
    }

    async fn run_body(&self, node: &WorkflowNode, input: String) -> Result<NodeStep, SwarmError> {
        let (mut result, error) = if node.agents.is_empty() {
            (ExecutionResult::completed(input, None), None)
        } else {
            let swarm = self.node_swarm(node)?;
            Box::pin(swarm.run_top_level(&input, None)).await
        };
        if let Some(err) = error {
            if err.is_terminal() {
                return Ok(NodeStep::Terminal(result, err));
            }
        }
        if result.success() {
            if let Some(output) = &node.output {
                match output(&result) {
                    Ok(content) => result.content = content,
                    Err(err) => {
                        tracing::warn!(node = %node.id, error = %err, "Output transform failed");
                        result.error = Some(err.to_string());
                    }
                }
            }
        }
        Ok(NodeStep::Done(result))
    }

    fn node_swarm(&self, node: &WorkflowNode) -> Result<Swarm, SwarmError> {
        let definition = node_definition(&self.inner.agents, node)?;
        let persistent = node
            .agents
            .iter()
            .filter(|pair| !pair.reset_context)
            .map(|pair| pair.agent.clone())
            .collect();
        Swarm::builder(definition, self.inner.env.registry.clone())
            .shared_config(self.inner.env.config.clone())
            .scratchpad(self.inner.env.scratchpad.clone())
            .read_tracking(self.inner.env.read_tracking.clone())
            .id(format!("{}/{}", self.inner.name, node.id))
            .parent_id(self.inner.name.clone())
            .node(node.id.clone())
            .scope(node.id.clone())
            .persistent_sessions(self.inner.store.clone(), persistent)
            .build()
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.inner.name)
            .field("start", &self.inner.start)
            .field("nodes", &self.inner.nodes.keys().collect::<Vec<_>>())
            .finish()
    }
}
