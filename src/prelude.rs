//! Convenience re-exports for common use.

pub use crate::agent::{AgentDefinition, SessionHandle};
pub use crate::config::OrchestrationConfig;
pub use crate::error::{Result, SwarmError};
pub use crate::events::{EventKind, OrchestrationEvent};
pub use crate::provider::{ModelProvider, ProviderRequest, ProviderResponse};
pub use crate::read_tracking::ReadTracking;
pub use crate::registry::Registry;
pub use crate::result::ExecutionResult;
pub use crate::scratchpad::Scratchpad;
pub use crate::snapshot::{capture, restore, RestoreResult, Snapshot};
pub use crate::swarm::{SubSwarmDefinition, Swarm, SwarmDefinition};
pub use crate::tools::{AgentTool, AgentToolParameters, Tool, ToolArguments, ToolExecutionContext};
pub use crate::types::{ContentPart, ModelConfig, ModelMessage, Role, Usage};
pub use crate::workflow::{NodeAgent, NodeContext, NodeDirective, Workflow, WorkflowNode, WorkflowRun};
