//! Always-available scratchpad tools.

use std::sync::Arc;

use async_trait::async_trait;

use super::arguments::ToolArguments;
use super::tool::{Tool, ToolExecutionContext};
use super::types::AgentToolParameters;
use crate::error::SwarmError;

pub const SCRATCHPAD_WRITE: &str = "scratchpad_write";
pub const SCRATCHPAD_READ: &str = "scratchpad_read";
pub const SCRATCHPAD_LIST: &str = "scratchpad_list";

/// The three scratchpad tools, ready for
/// [`ToolSet::add_always_available`](super::ToolSet::add_always_available).
pub fn scratchpad_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ScratchpadWrite::new()),
        Arc::new(ScratchpadRead::new()),
        Arc::new(ScratchpadList::new()),
    ]
}

pub struct ScratchpadWrite {
    parameters: AgentToolParameters,
}

impl ScratchpadWrite {
    pub fn new() -> Self {
        Self {
            parameters: AgentToolParameters::object()
                .string("path", "Entry path, e.g. plan/steps", true)
                .string("content", "Content to store", true)
                .string("title", "Short title", true)
                .build(),
        }
    }
}

impl Default for ScratchpadWrite {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ScratchpadWrite {
    fn name(&self) -> &str {
        SCRATCHPAD_WRITE
    }

    fn description(&self) -> &str {
        "Store content in the shared scratchpad"
    }

    fn parameters(&self) -> &AgentToolParameters {
        &self.parameters
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, SwarmError> {
        let path = args.get_str("path")?;
        let content = args.get_str("content")?;
        let title = args.get_str("title")?;
        ctx.scratchpad.write(path, content, title);
        Ok(serde_json::json!({ "stored": path, "size": content.len() }))
    }
}

pub struct ScratchpadRead {
    parameters: AgentToolParameters,
}

impl ScratchpadRead {
    pub fn new() -> Self {
        Self {
            parameters: AgentToolParameters::object()
                .string("path", "Entry path", true)
                .build(),
        }
    }
}

impl Default for ScratchpadRead {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ScratchpadRead {
    fn name(&self) -> &str {
        SCRATCHPAD_READ
    }

    fn description(&self) -> &str {
        "Read an entry from the shared scratchpad"
    }

    fn parameters(&self) -> &AgentToolParameters {
        &self.parameters
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, SwarmError> {
        let path = args.get_str("path")?;
        let entry = ctx.scratchpad.read(path).ok_or_else(|| SwarmError::ToolExecution {
            tool_name: SCRATCHPAD_READ.to_string(),
            message: format!("no scratchpad entry at '{path}'"),
        })?;
        Ok(serde_json::to_value(entry)?)
    }
}

pub struct ScratchpadList {
    parameters: AgentToolParameters,
}

impl ScratchpadList {
    pub fn new() -> Self {
        Self {
            parameters: AgentToolParameters::empty(),
        }
    }
}

impl Default for ScratchpadList {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ScratchpadList {
    fn name(&self) -> &str {
        SCRATCHPAD_LIST
    }

    fn description(&self) -> &str {
        "List scratchpad entries"
    }

    fn parameters(&self) -> &AgentToolParameters {
        &self.parameters
    }

    async fn execute(
        &self,
        _args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, SwarmError> {
        let entries: Vec<_> = ctx
            .scratchpad
            .list()
            .into_iter()
            .map(|(path, title, size)| serde_json::json!({ "path": path, "title": title, "size": size }))
            .collect();
        Ok(serde_json::Value::Array(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scratchpad::Scratchpad;

    #[tokio::test]
    async fn write_then_read_through_context() {
        let ctx = ToolExecutionContext {
            agent_name: "planner".into(),
            scratchpad: Scratchpad::new(),
            ..Default::default()
        };
        ScratchpadWrite::new()
            .execute(
                &ToolArguments::new(serde_json::json!({
                    "path": "plan", "content": "ship it", "title": "Plan"
                })),
                &ctx,
            )
            .await
            .unwrap();

        let read = ScratchpadRead::new()
            .execute(&ToolArguments::new(serde_json::json!({"path": "plan"})), &ctx)
            .await
            .unwrap();
        assert_eq!(read["content"], "ship it");

        let listed = ScratchpadList::new()
            .execute(&ToolArguments::new(serde_json::json!({})), &ctx)
            .await
            .unwrap();
        assert_eq!(listed[0]["path"], "plan");
    }

    #[tokio::test]
    async fn reading_missing_entry_is_a_tool_error() {
        let err = ScratchpadRead::new()
            .execute(
                &ToolArguments::new(serde_json::json!({"path": "nope"})),
                &ToolExecutionContext::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SwarmError::ToolExecution { .. }));
    }
}
