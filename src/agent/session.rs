//! One conversation with a model, plus its tool loop.

use std::sync::Arc;

use serde_json::json;

use super::context::{context_percentage, ContextState};
use super::definition::AgentDefinition;
use crate::config::OrchestrationConfig;
use crate::error::{SwarmError, TimeoutScope};
use crate::events::{EventKind, EventOrigin};
use crate::provider::ProviderRequest;
use crate::read_tracking::ReadTracking;
use crate::registry::Registry;
use crate::scratchpad::Scratchpad;
use crate::tools::{scratchpad_tools, ToolArguments, ToolExecutionContext, ToolSet};
use crate::types::{AgentToolCall, Cost, ModelMessage, Role, Usage};
use crate::util::timeout::with_timeout;

/// Shared collaborators every session in a swarm or workflow sees.
#[derive(Debug, Clone, Default)]
pub struct SessionEnv {
    pub registry: Registry,
    pub config: Arc<OrchestrationConfig>,
    pub read_tracking: ReadTracking,
    pub scratchpad: Scratchpad,
}

/// Tool set for a fresh session: scratchpad tools plus the registry tools
/// the definition declares.
pub fn build_toolset(definition: &AgentDefinition, registry: &Registry) -> Result<ToolSet, SwarmError> {
    let tools = ToolSet::new();
    for tool in scratchpad_tools() {
        tools.add_always_available(tool);
    }
    for name in &definition.tools {
        let tool = registry.tool(name).map_err(|_| {
            SwarmError::config(format!(
                "agent '{}' declares unregistered tool '{name}'",
                definition.name
            ))
        })?;
        tools.add(tool);
    }
    Ok(tools)
}

/// A single conversation bound to an [`AgentDefinition`].
pub struct AgentSession {
    /// Session key: the agent name, or `delegate@caller` for instances.
    name: String,
    /// Owner of this session's read-tracking entries.
    reads_key: String,
    definition: Arc<AgentDefinition>,
    messages: Vec<ModelMessage>,
    context: ContextState,
    tools: ToolSet,
    env: SessionEnv,
}

impl AgentSession {
    /// Create a session seeded with its system turn.
    pub fn new(
        name: impl Into<String>,
        definition: Arc<AgentDefinition>,
        tools: ToolSet,
        env: SessionEnv,
    ) -> Self {
        let name = name.into();
        let messages = vec![ModelMessage::system(definition.system_prompt.clone())];
        Self {
            reads_key: name.clone(),
            name,
            definition,
            messages,
            context: ContextState::default(),
            tools,
            env,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Track reads as `scope/name`, so same-named sessions in a sub-swarm
    /// or workflow node never share digests with their parent.
    pub fn with_read_scope(mut self, scope: Option<&str>) -> Self {
        if let Some(scope) = scope {
            self.reads_key = format!("{scope}/{}", self.name);
        }
        self
    }

    pub fn reads_key(&self) -> &str {
        &self.reads_key
    }

    pub fn definition(&self) -> &AgentDefinition {
        &self.definition
    }

    pub fn messages(&self) -> &[ModelMessage] {
        &self.messages
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    pub fn usage(&self) -> Usage {
        self.context.usage
    }

    /// Context state with the currently engaged skill.
    pub fn context_state(&self) -> ContextState {
        let mut state = self.context.clone();
        state.active_skill_path = self.tools.active_skill_path();
        state
    }

    pub fn activate_skill(&mut self, path: &str) -> Result<(), SwarmError> {
        let skill = self.definition.skill(path).ok_or_else(|| {
            SwarmError::InvalidArgument(format!(
                "agent '{}' does not declare skill '{path}'",
                self.definition.name
            ))
        })?;
        self.tools.activate_skill(skill);
        self.context.active_skill_path = Some(path.to_string());
        Ok(())
    }

    pub fn deactivate_skill(&mut self) {
        self.tools.deactivate_skill();
        self.context.active_skill_path = None;
    }

    /// Drop the conversation back to its initial system turn.
    pub fn reset(&mut self) {
        self.messages.truncate(0);
        self.messages
            .push(ModelMessage::system(self.definition.system_prompt.clone()));
        self.context = ContextState::default();
        self.tools.deactivate_skill();
    }

    /// Overwrite history and context state in place.
    ///
    /// A recorded skill is engaged again only while the definition still
    /// declares it.
    pub fn restore_state(&mut self, messages: Vec<ModelMessage>, mut context: ContextState) {
        match context.active_skill_path.as_deref() {
            Some(path) => match self.definition.skill(path) {
                Some(skill) => self.tools.activate_skill(skill),
                None => {
                    tracing::warn!(
                        agent = %self.name,
                        skill = %path,
                        "Restored skill is no longer declared; leaving tools unrestricted"
                    );
                    self.tools.deactivate_skill();
                    context.active_skill_path = None;
                }
            },
            None => self.tools.deactivate_skill(),
        }
        self.messages = messages;
        self.context = context;
    }

    /// Run one turn: send `message`, execute requested tools, and repeat
    /// until the model answers without tool calls.
    pub async fn ask(&mut self, message: &str, origin: &EventOrigin) -> Result<String, SwarmError> {
        let timeout = self.env.config.turn_timeout();
        let name = self.name.clone();
        let result = with_timeout(TimeoutScope::Turn, timeout, self.run_turn(message, origin)).await;
        if let Err(SwarmError::Timeout { scope, after_ms }) = &result {
            tracing::warn!(agent = %name, after_ms, "Agent turn timed out");
            origin.emit(
                EventKind::Timeout {
                    scope: *scope,
                    after_ms: *after_ms,
                },
                Some(&name),
            );
        }
        result
    }

    async fn run_turn(&mut self, message: &str, origin: &EventOrigin) -> Result<String, SwarmError> {
        let provider = self.env.registry.provider(&self.definition.model.provider)?;
        self.messages.push(ModelMessage::user(message));

        let max_iterations = self.env.config.max_tool_iterations;
        for _ in 0..max_iterations {
            let request = ProviderRequest {
                agent: self.name.clone(),
                messages: self.messages.clone(),
                tools: self.tools.definitions(),
                model: self.definition.model.clone(),
            };
            let response = {
                let (provider, request, name) = (&provider, &request, self.name.as_str());
                self.env
                    .config
                    .retry
                    .execute(
                        move || provider.send(request),
                        |attempt, err| {
                            origin.emit(
                                EventKind::TurnRetry {
                                    attempt,
                                    error: err.to_string(),
                                },
                                Some(name),
                            )
                        },
                    )
                    .await?
            };

            let percentage = self.track_usage(&response.usage, response.tool_calls.len(), origin);

            if response.tool_calls.is_empty() {
                self.messages
                    .push(ModelMessage::assistant(&response.content).with_usage(response.usage));
                if percentage.is_some_and(|pct| pct >= f64::from(self.env.config.compaction_threshold)) {
                    let removed = self.compact_history();
                    if removed > 0 {
                        origin.emit(
                            EventKind::CompactionApplied {
                                removed_messages: removed,
                            },
                            Some(&self.name),
                        );
                    }
                }
                origin.emit(
                    EventKind::AgentStop {
                        content: response.content.clone(),
                    },
                    Some(&self.name),
                );
                return Ok(response.content);
            }

            self.messages.push(
                ModelMessage::assistant_with_tool_calls(
                    response.content.clone(),
                    response.tool_calls.clone(),
                )
                .with_usage(response.usage),
            );
            for call in &response.tool_calls {
                origin.emit(
                    EventKind::ToolCall {
                        tool: call.name.clone(),
                        call_id: call.id.clone(),
                        arguments: call.arguments.clone(),
                    },
                    Some(&self.name),
                );
                let (result, is_error) = self.execute_tool(call).await?;
                origin.emit(
                    EventKind::ToolResult {
                        tool: call.name.clone(),
                        call_id: call.id.clone(),
                        is_error,
                    },
                    Some(&self.name),
                );
                self.messages
                    .push(ModelMessage::tool_result(call.id.clone(), result, is_error));
            }
        }

        Err(SwarmError::InvalidState(format!(
            "agent '{}' exceeded {max_iterations} tool iterations in one turn",
            self.name
        )))
    }

    /// Fold one call's usage into the context state; returns the share of
    /// the context window it used.
    fn track_usage(&mut self, usage: &Usage, tool_calls: usize, origin: &EventOrigin) -> Option<f64> {
        let model = &self.definition.model;
        let cost = match (model.input_price_per_m, model.output_price_per_m) {
            (None, None) => None,
            (input, output) => Some(Cost::from_usage(
                usage,
                input.unwrap_or_default(),
                output.unwrap_or_default(),
            )),
        };
        self.context.record(usage, cost.as_ref());
        origin.emit(
            EventKind::AgentStep {
                usage: *usage,
                cost,
                tool_calls,
            },
            Some(&self.name),
        );

        let percentage = context_percentage(usage, model.context_window)?;
        for threshold in self
            .context
            .crossed_thresholds(percentage, &self.env.config.context_warning_thresholds)
        {
            tracing::warn!(agent = %self.name, threshold, percentage, "Context usage threshold crossed");
            origin.emit(
                EventKind::ContextWarning {
                    threshold,
                    percentage,
                },
                Some(&self.name),
            );
        }
        Some(percentage)
    }

    async fn execute_tool(&self, call: &AgentToolCall) -> Result<(serde_json::Value, bool), SwarmError> {
        let Some(tool) = self.tools.get(&call.name) else {
            tracing::warn!(agent = %self.name, tool = %call.name, "Model requested an inactive or unknown tool");
            return Ok((json!({ "error": format!("Tool not found: {}", call.name) }), true));
        };
        let ctx = ToolExecutionContext {
            agent_name: self.reads_key.clone(),
            tool_call_id: Some(call.id.clone()),
            read_tracking: self.env.read_tracking.clone(),
            scratchpad: self.env.scratchpad.clone(),
            metadata: json!({ "agent": self.definition.name }),
        };
        match tool.execute(&ToolArguments::new(call.arguments.clone()), &ctx).await {
            Ok(value) => Ok((value, false)),
            Err(err) if err.is_terminal() => Err(err),
            Err(err) => {
                tracing::debug!(agent = %self.name, tool = %call.name, error = %err, "Tool call failed");
                Ok((json!({ "error": err.to_string() }), true))
            }
        }
    }

    /// Keep the system turn and the most recent messages, replacing the rest
    /// with a marker turn. Returns how many messages were removed.
    pub fn compact_history(&mut self) -> usize {
        let head = usize::from(matches!(self.messages.first(), Some(m) if m.role == Role::System));
        let keep = self.env.config.keep_recent_messages;
        if self.messages.len() <= head + keep {
            return 0;
        }
        let mut cut = self.messages.len() - keep;
        // never start the kept tail with an orphaned tool result
        while cut < self.messages.len() && self.messages[cut].role == Role::Tool {
            cut += 1;
        }
        let removed = cut - head;
        if removed == 0 {
            return 0;
        }
        self.messages.drain(head..cut);
        self.messages.insert(
            head,
            ModelMessage::system(format!("[{removed} earlier messages were compacted]")),
        );
        self.context.compaction_applied = true;
        tracing::debug!(agent = %self.name, removed, "Compacted conversation history");
        removed
    }
}

impl std::fmt::Debug for AgentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSession")
            .field("name", &self.name)
            .field("messages", &self.messages.len())
            .field("context", &self.context)
            .finish()
    }
}

/// Shareable handle to a session; turns are serialized by its lock.
#[derive(Clone)]
pub struct SessionHandle {
    name: String,
    tools: ToolSet,
    session: Arc<tokio::sync::Mutex<AgentSession>>,
}

impl SessionHandle {
    pub fn new(session: AgentSession) -> Self {
        Self {
            name: session.name.clone(),
            tools: session.tools.clone(),
            session: Arc::new(tokio::sync::Mutex::new(session)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The session's tool set, reachable without taking the turn lock.
    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, AgentSession> {
        self.session.lock().await
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").field("name", &self.name).finish()
    }
}
