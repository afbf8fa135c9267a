//! Tool trait, closure-based tools, and the renaming decorator.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use super::arguments::ToolArguments;
use super::types::AgentToolParameters;
use crate::error::SwarmError;
use crate::provider::ToolDefinition;
use crate::read_tracking::ReadTracking;
use crate::scratchpad::Scratchpad;

/// Context available during tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolExecutionContext {
    /// Identity of the executing session: its key, prefixed with the
    /// sub-swarm path or workflow node when nested.
    pub agent_name: String,
    /// Tool call id (if provided by the model).
    pub tool_call_id: Option<String>,
    /// Read-tracking store shared by the owning swarm or workflow.
    pub read_tracking: ReadTracking,
    /// Scratch storage shared by the owning swarm or workflow.
    pub scratchpad: Scratchpad,
    /// Additional metadata for the tool.
    pub metadata: serde_json::Value,
}

impl ToolExecutionContext {
    /// Record a read of `resource` by the executing agent.
    pub fn record_read(&self, resource: &str, content: impl AsRef<[u8]>) -> String {
        self.read_tracking.record_read(&self.agent_name, resource, content)
    }

    /// Reject an edit when the executing agent's last read is stale.
    pub fn check_edit(&self, resource: &str, current_content: impl AsRef<[u8]>) -> Result<(), SwarmError> {
        self.read_tracking
            .check_edit(&self.agent_name, resource, current_content)
    }
}

/// Core tool trait: implement to create custom tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match what the model calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema parameters.
    fn parameters(&self) -> &AgentToolParameters;

    /// Execute the tool with parsed arguments.
    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, SwarmError>;

    /// Schema advertised to the model.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters().schema.clone(),
        }
    }
}

/// Type alias for the tool handler function.
type ToolHandler = dyn Fn(
        ToolArguments,
        ToolExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, SwarmError>> + Send>>
    + Send
    + Sync;

/// Closure-based tool for quick tool creation.
pub struct AgentTool {
    name: String,
    description: String,
    parameters: AgentToolParameters,
    handler: Arc<ToolHandler>,
}

impl AgentTool {
    /// Create a tool from a closure.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: AgentToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments, ToolExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, SwarmError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(move |args, ctx| Box::pin(handler(args, ctx))),
        }
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &AgentToolParameters {
        &self.parameters
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, SwarmError> {
        (self.handler)(args.clone(), ctx.clone()).await
    }
}

impl std::fmt::Debug for AgentTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

/// Exposes a tool under another name (and optionally another description)
/// while forwarding execution to the wrapped implementation.
///
/// Lookups always use the registered (outer) name.
pub struct RenamedTool {
    inner: Arc<dyn Tool>,
    name: String,
    description: Option<String>,
}

impl RenamedTool {
    pub fn new(inner: Arc<dyn Tool>, name: impl Into<String>) -> Self {
        Self {
            inner,
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Name of the wrapped implementation.
    pub fn inner_name(&self) -> &str {
        self.inner.name()
    }
}

#[async_trait]
impl Tool for RenamedTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        self.description
            .as_deref()
            .unwrap_or_else(|| self.inner.description())
    }

    fn parameters(&self) -> &AgentToolParameters {
        self.inner.parameters()
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, SwarmError> {
        self.inner.execute(args, ctx).await
    }
}
