//! Tool system for function calling.

pub mod arguments;
pub mod scratchpad;
pub mod tool;
pub mod toolset;
pub mod types;

pub use arguments::ToolArguments;
pub use scratchpad::scratchpad_tools;
pub use tool::{AgentTool, RenamedTool, Tool, ToolExecutionContext};
pub use toolset::{SkillDefinition, ToolMode, ToolSet};
pub use types::AgentToolParameters;
