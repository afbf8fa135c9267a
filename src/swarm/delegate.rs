//! `delegate_to_<target>` tools wired into each session.

use std::sync::Weak;

use async_trait::async_trait;
use serde_json::json;

use super::{Swarm, SwarmInner};
use crate::error::SwarmError;
use crate::tools::{AgentToolParameters, Tool, ToolArguments, ToolExecutionContext};

pub const DELEGATE_TOOL_PREFIX: &str = "delegate_to_";

pub fn delegate_tool_name(target: &str) -> String {
    format!("{DELEGATE_TOOL_PREFIX}{target}")
}

/// Forwards a message from `caller` to `target` through the owning swarm.
pub struct DelegateTool {
    name: String,
    description: String,
    caller: String,
    target: String,
    swarm: Weak<SwarmInner>,
    parameters: AgentToolParameters,
}

impl DelegateTool {
    pub(crate) fn new(swarm: Weak<SwarmInner>, caller: &str, target: &str, description: &str) -> Self {
        let description = if description.is_empty() {
            format!("Delegate a task to {target}")
        } else {
            format!("Delegate a task to {target}: {description}")
        };
        Self {
            name: delegate_tool_name(target),
            description,
            caller: caller.to_string(),
            target: target.to_string(),
            swarm,
            parameters: AgentToolParameters::object()
                .string("message", "Task or question for the delegate", true)
                .build(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

#[async_trait]
impl Tool for DelegateTool {
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
        _ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, SwarmError> {
        let message = args.get_str("message")?;
        let swarm = Swarm::upgrade(&self.swarm)
            .ok_or_else(|| SwarmError::InvalidState("delegation target's swarm was dropped".into()))?;
        let result = swarm.invoke(&self.target, &self.caller, message).await?;
        match result.error {
            Some(message) => Err(SwarmError::ToolExecution {
                tool_name: self.name.clone(),
                message,
            }),
            None => Ok(json!({
                "agent": result.agent,
                "content": result.content,
            })),
        }
    }
}
