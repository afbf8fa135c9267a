//! Delegation graph: top-level agents, per-caller delegation instances,
//! and nested sub-swarms, with per-scope cycle detection.
//!
//! Delegation targets resolve in a fixed order:
//! 1. a top-level agent (the lead, or an agent shared across delegations),
//! 2. an existing `delegate@caller` instance,
//! 3. a registered sub-swarm,
//! 4. a new `delegate@caller` instance for a defined agent.

pub mod call_stack;
pub mod definition;
pub mod delegate;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;

pub use call_stack::{CallFrame, CallStack};
pub use definition::{SubSwarmDefinition, SwarmDefinition};
pub use delegate::{delegate_tool_name, DelegateTool, DELEGATE_TOOL_PREFIX};

use crate::agent::{build_toolset, AgentDefinition, AgentSession, SessionEnv, SessionHandle};
use crate::config::OrchestrationConfig;
use crate::error::{SwarmError, TimeoutScope};
use crate::events::{self, EventCallback, EventKind, EventLog, EventOrigin};
use crate::read_tracking::ReadTracking;
use crate::registry::Registry;
use crate::result::ExecutionResult;
use crate::scratchpad::Scratchpad;
use crate::tools::ToolSet;
use crate::util::timeout::with_timeout;

/// Key of a delegation instance: `delegate@caller`.
pub fn instance_key(delegate: &str, caller: &str) -> String {
    format!("{delegate}@{caller}")
}

/// Split an instance key into `(delegate, caller)`.
pub fn parse_instance_key(key: &str) -> Option<(&str, &str)> {
    let (delegate, caller) = key.split_once('@')?;
    (!delegate.is_empty() && !caller.is_empty()).then_some((delegate, caller))
}

/// Sessions that outlive a single swarm, keyed by agent name.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<Mutex<BTreeMap<String, SessionHandle>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<SessionHandle> {
        self.sessions.lock().get(name).cloned()
    }

    pub fn sessions(&self) -> Vec<SessionHandle> {
        self.sessions.lock().values().cloned().collect()
    }

    pub(crate) fn insert_if_absent(&self, name: &str, handle: SessionHandle) -> SessionHandle {
        self.sessions
            .lock()
            .entry(name.to_string())
            .or_insert(handle)
            .clone()
    }
}

/// What a delegation target name resolved to.
#[derive(Debug, Clone)]
pub enum DelegationTarget {
    /// A top-level session.
    Agent(SessionHandle),
    /// A per-caller instance; ephemeral ones are reset after every call.
    Instance {
        key: String,
        session: SessionHandle,
        keep_context: bool,
    },
    /// A nested swarm with its own call stack.
    SubSwarm { swarm: Swarm, keep_context: bool },
}

pub(crate) struct SwarmInner {
    id: String,
    parent_id: Option<String>,
    node: Option<String>,
    /// Sub-swarm path (or workflow node) prefixed to read-tracking keys.
    scope: Option<String>,
    lead: String,
    agents: BTreeMap<String, Arc<AgentDefinition>>,
    sub_swarm_defs: BTreeMap<String, SubSwarmDefinition>,
    env: SessionEnv,
    call_stack: CallStack,
    sessions: Mutex<BTreeMap<String, SessionHandle>>,
    instances: Mutex<BTreeMap<String, SessionHandle>>,
    sub_swarms: Mutex<BTreeMap<String, Swarm>>,
    store: Option<(SessionStore, BTreeSet<String>)>,
    callbacks: Mutex<Vec<EventCallback>>,
}

/// Builder for [`Swarm`].
pub struct SwarmBuilder {
    definition: SwarmDefinition,
    registry: Registry,
    config: Arc<OrchestrationConfig>,
    scratchpad: Scratchpad,
    read_tracking: ReadTracking,
    id: Option<String>,
    parent_id: Option<String>,
    node: Option<String>,
    scope: Option<String>,
    store: Option<(SessionStore, BTreeSet<String>)>,
}

impl SwarmBuilder {
    pub fn config(mut self, config: OrchestrationConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn shared_config(mut self, config: Arc<OrchestrationConfig>) -> Self {
        self.config = config;
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

    /// Override the hierarchical identity.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub(crate) fn parent_id(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Tag emitted events with a workflow node.
    pub fn node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    /// Track this swarm's reads under `scope/`.
    pub(crate) fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Take the primary sessions of `names` from `store`, creating and
    /// storing them on first use.
    pub fn persistent_sessions(mut self, store: SessionStore, names: BTreeSet<String>) -> Self {
        self.store = Some((store, names));
        self
    }

    pub fn build(self) -> Result<Swarm, SwarmError> {
        self.definition.validate()?;
        self.definition.check_registry(&self.registry)?;

        let id = self
            .id
            .or_else(|| self.definition.name.clone())
            .unwrap_or_else(|| self.definition.lead.clone());
        let agents = self
            .definition
            .agents
            .into_iter()
            .map(|agent| (agent.name.clone(), Arc::new(agent)))
            .collect();
        let sub_swarm_defs = self
            .definition
            .sub_swarms
            .into_iter()
            .map(|sub| (sub.name.clone(), sub))
            .collect();

        tracing::debug!(swarm_id = %id, lead = %self.definition.lead, "Swarm built");
        Ok(Swarm {
            inner: Arc::new(SwarmInner {
                call_stack: CallStack::new(id.clone()),
                id,
                parent_id: self.parent_id,
                node: self.node,
                scope: self.scope,
                lead: self.definition.lead,
                agents,
                sub_swarm_defs,
                env: SessionEnv {
                    registry: self.registry,
                    config: self.config,
                    read_tracking: self.read_tracking,
                    scratchpad: self.scratchpad,
                },
                sessions: Mutex::default(),
                instances: Mutex::default(),
                sub_swarms: Mutex::default(),
                store: self.store,
                callbacks: Mutex::default(),
            }),
        })
    }
}

/// A delegation graph handle; clones share state.
#[derive(Clone)]
pub struct Swarm {
    inner: Arc<SwarmInner>,
}

impl Swarm {
    pub fn builder(definition: SwarmDefinition, registry: Registry) -> SwarmBuilder {
        SwarmBuilder {
            definition,
            registry,
            config: Arc::new(OrchestrationConfig::default()),
            scratchpad: Scratchpad::new(),
            read_tracking: ReadTracking::new(),
            id: None,
            parent_id: None,
            node: None,
            scope: None,
            store: None,
        }
    }

    /// Build with default configuration.
    pub fn new(definition: SwarmDefinition, registry: Registry) -> Result<Self, SwarmError> {
        Self::builder(definition, registry).build()
    }

    pub(crate) fn upgrade(weak: &Weak<SwarmInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.inner.parent_id.as_deref()
    }

    pub fn lead(&self) -> &str {
        &self.inner.lead
    }

    pub fn config(&self) -> &OrchestrationConfig {
        &self.inner.env.config
    }

    pub fn scratchpad(&self) -> &Scratchpad {
        &self.inner.env.scratchpad
    }

    pub fn read_tracking(&self) -> &ReadTracking {
        &self.inner.env.read_tracking
    }

    pub fn agent_definition(&self, name: &str) -> Option<&AgentDefinition> {
        self.inner.agents.get(name).map(|def| def.as_ref())
    }

    /// Register a callback for every event emitted by this swarm's runs.
    pub fn on_event(&self, callback: impl Fn(&events::OrchestrationEvent) + Send + Sync + 'static) {
        self.inner.callbacks.lock().push(Arc::new(callback));
    }

    /// Names active on this scope's call stack in the current run.
    pub fn call_stack(&self) -> Vec<String> {
        self.inner.call_stack.frames()
    }

    fn origin(&self) -> EventOrigin {
        EventOrigin {
            swarm_id: Some(self.inner.id.clone()),
            parent_swarm_id: self.inner.parent_id.clone(),
            node: self.inner.node.clone(),
        }
    }

    /// Whether `name` is the lead or an agent shared across delegations.
    pub fn is_top_level(&self, name: &str) -> bool {
        name == self.inner.lead
            || self
                .inner
                .agents
                .get(name)
                .is_some_and(|def| def.shared_across_delegations)
    }

    /// Whether `key` names a delegation instance this graph could hold.
    pub fn accepts_instance(&self, key: &str) -> bool {
        let Some((delegate, caller)) = parse_instance_key(key) else {
            return false;
        };
        !self.is_top_level(delegate)
            && self.inner.agents.contains_key(delegate)
            && self
                .inner
                .agents
                .get(caller)
                .is_some_and(|def| def.can_delegate_to(delegate))
    }

    /// Primary session of a top-level agent, created on first access.
    pub fn session(&self, name: &str) -> Result<SessionHandle, SwarmError> {
        if !self.is_top_level(name) {
            return Err(SwarmError::InvalidArgument(format!(
                "'{name}' is not a top-level agent of swarm '{}'",
                self.inner.id
            )));
        }
        if let Some(handle) = self.inner.sessions.lock().get(name).cloned() {
            return Ok(handle);
        }
        let definition = self.definition_of(name)?;

        let handle = match &self.inner.store {
            Some((store, names)) if names.contains(name) => {
                let handle = match store.get(name) {
                    Some(handle) => handle,
                    None => store.insert_if_absent(name, self.create_session(name, &definition, None)?),
                };
                // stored sessions may have been wired to an earlier swarm
                self.install_delegate_tools(handle.tools(), &definition);
                handle
            }
            _ => self.create_session(name, &definition, self.inner.scope.as_deref())?,
        };
        Ok(self
            .inner
            .sessions
            .lock()
            .entry(name.to_string())
            .or_insert(handle)
            .clone())
    }

    /// Delegation instance for `key`, created on first access.
    pub fn instance(&self, key: &str) -> Result<SessionHandle, SwarmError> {
        if let Some(handle) = self.inner.instances.lock().get(key).cloned() {
            return Ok(handle);
        }
        if !self.accepts_instance(key) {
            return Err(SwarmError::InvalidArgument(format!(
                "'{key}' is not a delegation instance of swarm '{}'",
                self.inner.id
            )));
        }
        let (delegate, _) = parse_instance_key(key)
            .ok_or_else(|| SwarmError::InvalidArgument(format!("malformed instance key '{key}'")))?;
        let definition = self.definition_of(delegate)?;
        let handle = self.create_session(key, &definition, self.inner.scope.as_deref())?;
        Ok(self
            .inner
            .instances
            .lock()
            .entry(key.to_string())
            .or_insert(handle)
            .clone())
    }

    /// Materialized top-level sessions, by agent name.
    pub fn sessions(&self) -> Vec<SessionHandle> {
        self.inner.sessions.lock().values().cloned().collect()
    }

    /// Materialized delegation instances, by key.
    pub fn instances(&self) -> Vec<(String, SessionHandle)> {
        self.inner
            .instances
            .lock()
            .iter()
            .map(|(key, handle)| (key.clone(), handle.clone()))
            .collect()
    }

    /// Registered sub-swarm, built and cached on first access.
    pub fn sub_swarm(&self, name: &str) -> Result<Option<Swarm>, SwarmError> {
        let Some(def) = self.inner.sub_swarm_defs.get(name) else {
            return Ok(None);
        };
        if let Some(swarm) = self.inner.sub_swarms.lock().get(name).cloned() {
            return Ok(Some(swarm));
        }
        let scope = match &self.inner.scope {
            Some(scope) => format!("{scope}/{name}"),
            None => name.to_string(),
        };
        let mut builder = Swarm::builder(def.swarm.clone(), self.inner.env.registry.clone())
            .shared_config(self.inner.env.config.clone())
            .scratchpad(self.inner.env.scratchpad.clone())
            .read_tracking(self.inner.env.read_tracking.clone())
            .id(format!("{}/{name}", self.inner.id))
            .parent_id(self.inner.id.clone())
            .scope(scope);
        if let Some(node) = &self.inner.node {
            builder = builder.node(node.clone());
        }
        let swarm = builder.build()?;
        tracing::debug!(swarm_id = %swarm.id(), parent = %self.inner.id, "Sub-swarm materialized");
        Ok(Some(
            self.inner
                .sub_swarms
                .lock()
                .entry(name.to_string())
                .or_insert(swarm)
                .clone(),
        ))
    }

    /// Materialized sub-swarms, by registered name.
    pub fn sub_swarms(&self) -> Vec<(String, Swarm)> {
        self.inner
            .sub_swarms
            .lock()
            .iter()
            .map(|(name, swarm)| (name.clone(), swarm.clone()))
            .collect()
    }

    /// Walk a `sub/.../leaf` path down to the swarm that owns `leaf`,
    /// materializing sub-swarms on the way. `None` when a segment is not
    /// a registered sub-swarm.
    pub fn owner_of<'a>(&self, path: &'a str) -> Result<Option<(Swarm, &'a str)>, SwarmError> {
        let mut swarm = self.clone();
        let mut rest = path;
        while let Some((sub, tail)) = rest.split_once('/') {
            match swarm.sub_swarm(sub)? {
                Some(next) => swarm = next,
                None => return Ok(None),
            }
            rest = tail;
        }
        Ok(Some((swarm, rest)))
    }

    /// Resolve a delegation target for `caller`.
    pub fn resolve(&self, target: &str, caller: &str) -> Result<DelegationTarget, SwarmError> {
        if self.is_top_level(target) {
            return Ok(DelegationTarget::Agent(self.session(target)?));
        }
        let key = instance_key(target, caller);
        let existing = self.inner.instances.lock().get(&key).cloned();
        if let Some(session) = existing {
            return Ok(DelegationTarget::Instance {
                keep_context: self.definition_of(target)?.keep_context,
                key,
                session,
            });
        }
        if let Some(swarm) = self.sub_swarm(target)? {
            let keep_context = self
                .inner
                .sub_swarm_defs
                .get(target)
                .is_some_and(|def| def.keep_context);
            return Ok(DelegationTarget::SubSwarm {
                swarm,
                keep_context,
            });
        }
        if let Some(definition) = self.inner.agents.get(target).cloned() {
            let handle = self.create_session(&key, &definition, self.inner.scope.as_deref())?;
            let session = self
                .inner
                .instances
                .lock()
                .entry(key.clone())
                .or_insert(handle)
                .clone();
            return Ok(DelegationTarget::Instance {
                key,
                session,
                keep_context: definition.keep_context,
            });
        }
        Err(SwarmError::UnknownTarget {
            target: target.to_string(),
            caller: caller.to_string(),
        })
    }

    /// Drop every materialized session and sub-swarm so the next access
    /// starts from the initial system turn.
    pub fn reset(&self) {
        self.inner.sessions.lock().clear();
        self.inner.instances.lock().clear();
        self.inner.sub_swarms.lock().clear();
    }

    /// Run `target` on behalf of `caller`.
    ///
    /// Circular delegation, unknown targets, and terminal transport errors
    /// are returned as errors; every other failure is captured in the
    /// result.
    pub fn invoke(
        &self,
        target: &str,
        caller: &str,
        message: &str,
    ) -> BoxFuture<'static, Result<ExecutionResult, SwarmError>> {
        let swarm = self.clone();
        let (target, caller, message) = (target.to_string(), caller.to_string(), message.to_string());
        async move {
            call_stack::within_run(swarm.delegate(&target, &caller, &message)).await
        }
        .boxed()
    }

    async fn delegate(&self, target: &str, caller: &str, message: &str) -> Result<ExecutionResult, SwarmError> {
        let origin = self.origin();
        let frame = match self.inner.call_stack.push(target) {
            Ok(frame) => frame,
            Err(err) => {
                if let SwarmError::CircularDependency { chain } = &err {
                    tracing::warn!(
                        swarm_id = %self.inner.id,
                        caller = %caller,
                        chain = %chain.join(" -> "),
                        "Circular delegation rejected"
                    );
                    origin.emit(EventKind::CircularDependency { chain: chain.clone() }, Some(caller));
                }
                return Err(err);
            }
        };
        let resolved = self.resolve(target, caller)?;

        let log = EventLog::new();
        let started = Instant::now();
        let outcome = events::scope(vec![log.callback()], async {
            origin.emit(
                EventKind::DelegationStart {
                    target: target.to_string(),
                    caller: caller.to_string(),
                    message: message.to_string(),
                },
                Some(caller),
            );
            let outcome = self.run_target(resolved, message).await;
            origin.emit(
                EventKind::DelegationComplete {
                    target: target.to_string(),
                    caller: caller.to_string(),
                    success: outcome.is_ok(),
                    duration_ms: started.elapsed().as_millis() as u64,
                },
                Some(caller),
            );
            outcome
        })
        .await;
        drop(frame);

        match outcome {
            Ok((content, agent)) => Ok(ExecutionResult::completed(content, Some(agent))
                .with_duration(started.elapsed())
                .with_logs(log.take())),
            Err(err) if err.is_terminal() => Err(err),
            Err(err) => {
                tracing::warn!(swarm_id = %self.inner.id, target = %target, error = %err, "Delegation failed");
                Ok(ExecutionResult::failure(&err, Some(target.to_string()))
                    .with_duration(started.elapsed())
                    .with_logs(log.take()))
            }
        }
    }

    async fn run_target(&self, target: DelegationTarget, message: &str) -> Result<(String, String), SwarmError> {
        let origin = self.origin();
        match target {
            DelegationTarget::Agent(handle) => {
                let mut session = handle.lock().await;
                let content = session.ask(message, &origin).await?;
                Ok((content, handle.name().to_string()))
            }
            DelegationTarget::Instance {
                key,
                session,
                keep_context,
            } => {
                let mut session = session.lock().await;
                let outcome = session.ask(message, &origin).await;
                if !keep_context {
                    session.reset();
                }
                outcome.map(|content| (content, key))
            }
            DelegationTarget::SubSwarm {
                swarm,
                keep_context,
            } => {
                let outcome = swarm.run_nested(message).await;
                if !keep_context {
                    swarm.reset();
                }
                outcome.map(|content| (content, swarm.id().to_string()))
            }
        }
    }

    /// Run this swarm's lead as a delegation target of a parent swarm.
    async fn run_nested(&self, prompt: &str) -> Result<String, SwarmError> {
        let origin = self.origin();
        origin.emit(
            EventKind::SwarmStart {
                prompt: prompt.to_string(),
            },
            Some(&self.inner.lead),
        );
        let outcome = self.run_lead(prompt).await;
        origin.emit(
            EventKind::SwarmStop {
                success: outcome.is_ok(),
                error: outcome.as_ref().err().map(ToString::to_string),
            },
            Some(&self.inner.lead),
        );
        outcome
    }

    async fn run_lead(&self, prompt: &str) -> Result<String, SwarmError> {
        let _frame = self.inner.call_stack.push(&self.inner.lead)?;
        let handle = self.session(&self.inner.lead)?;
        let mut session = handle.lock().await;
        session.ask(prompt, &self.origin()).await
    }

    /// Run the lead against `prompt` under the run timeout.
    ///
    /// Never fails: errors are carried in the returned result together with
    /// every event observed during the run.
    pub async fn execute(&self, prompt: &str) -> ExecutionResult {
        let callbacks = self.inner.callbacks.lock().clone();
        let timeout = self.inner.env.config.run_timeout();
        events::scope(callbacks, self.run_top_level(prompt, timeout))
            .await
            .0
    }

    /// A fresh top-level run; the error, if any, is returned alongside the
    /// result so callers can tell terminal failures apart.
    pub(crate) async fn run_top_level(
        &self,
        prompt: &str,
        timeout: Option<Duration>,
    ) -> (ExecutionResult, Option<SwarmError>) {
        let log = EventLog::new();
        let origin = self.origin();
        let lead = self.inner.lead.clone();
        let started = Instant::now();

        let outcome = events::scope(
            vec![log.callback()],
            call_stack::new_run(async {
                tracing::debug!(swarm_id = %self.inner.id, lead = %lead, "Swarm run started");
                origin.emit(
                    EventKind::SwarmStart {
                        prompt: prompt.to_string(),
                    },
                    Some(&lead),
                );
                let outcome = with_timeout(TimeoutScope::Run, timeout, self.run_lead(prompt)).await;
                if let Err(SwarmError::Timeout {
                    scope: TimeoutScope::Run,
                    after_ms,
                }) = &outcome
                {
                    tracing::warn!(swarm_id = %self.inner.id, after_ms, "Swarm run timed out");
                    origin.emit(
                        EventKind::Timeout {
                            scope: TimeoutScope::Run,
                            after_ms: *after_ms,
                        },
                        Some(&lead),
                    );
                }
                origin.emit(
                    EventKind::SwarmStop {
                        success: outcome.is_ok(),
                        error: outcome.as_ref().err().map(ToString::to_string),
                    },
                    Some(&lead),
                );
                outcome
            }),
        )
        .await;

        let (result, error) = match outcome {
            Ok(content) => (ExecutionResult::completed(content, Some(lead)), None),
            Err(err) => {
                tracing::warn!(swarm_id = %self.inner.id, error = %err, "Swarm run failed");
                (ExecutionResult::failure(&err, Some(lead)), Some(err))
            }
        };
        (
            result.with_duration(started.elapsed()).with_logs(log.take()),
            error,
        )
    }

    fn definition_of(&self, name: &str) -> Result<Arc<AgentDefinition>, SwarmError> {
        self.inner
            .agents
            .get(name)
            .cloned()
            .ok_or_else(|| SwarmError::InvalidArgument(format!("agent '{name}' is not defined")))
    }

    fn create_session(
        &self,
        key: &str,
        definition: &Arc<AgentDefinition>,
        scope: Option<&str>,
    ) -> Result<SessionHandle, SwarmError> {
        let tools = build_toolset(definition, &self.inner.env.registry)?;
        self.install_delegate_tools(&tools, definition);
        tracing::debug!(swarm_id = %self.inner.id, session = %key, "Session created");
        Ok(SessionHandle::new(
            AgentSession::new(key, definition.clone(), tools, self.inner.env.clone()).with_read_scope(scope),
        ))
    }

    /// Replace any delegate tools with ones bound to this swarm.
    fn install_delegate_tools(&self, tools: &ToolSet, definition: &AgentDefinition) {
        for name in tools.all_names() {
            if name.starts_with(DELEGATE_TOOL_PREFIX) {
                tools.remove(&name);
            }
        }
        for target in &definition.delegates_to {
            let description = match self.inner.agents.get(target) {
                Some(def) => def.description.clone(),
                None => self
                    .inner
                    .sub_swarm_defs
                    .get(target)
                    .map(|sub| sub.swarm.description.clone())
                    .unwrap_or_default(),
            };
            tools.add_always_available(Arc::new(DelegateTool::new(
                Arc::downgrade(&self.inner),
                &definition.name,
                target,
                &description,
            )));
        }
    }
}

impl std::fmt::Debug for Swarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swarm")
            .field("id", &self.inner.id)
            .field("lead", &self.inner.lead)
            .field("agents", &self.inner.agents.keys().collect::<Vec<_>>())
            .field("sub_swarms", &self.inner.sub_swarm_defs.keys().collect::<Vec<_>>())
            .finish()
    }
}
