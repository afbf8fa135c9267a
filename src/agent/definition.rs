//! Immutable agent configuration.

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::tools::SkillDefinition;
use crate::types::ModelConfig;

fn default_true() -> bool {
    true
}

/// Configuration for one agent, produced by an external loader.
///
/// The orchestration layer references definitions and never mutates them.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct AgentDefinition {
    #[builder(into)]
    pub name: String,
    #[serde(default)]
    #[builder(into, default)]
    pub description: String,
    pub model: ModelConfig,
    #[serde(default)]
    #[builder(into, default)]
    pub system_prompt: String,
    /// Registry tool names available to this agent.
    #[serde(default)]
    #[builder(default)]
    pub tools: Vec<String>,
    /// Agents or sub-swarms this agent may delegate to.
    #[serde(default)]
    #[builder(default)]
    pub delegates_to: Vec<String>,
    /// One session shared by every caller instead of one instance per caller.
    #[serde(default)]
    #[builder(default)]
    pub shared_across_delegations: bool,
    /// Whether a delegation instance keeps its conversation between calls.
    #[serde(default = "default_true")]
    #[builder(default = true)]
    pub keep_context: bool,
    #[serde(default)]
    #[builder(default)]
    pub skills: Vec<SkillDefinition>,
}

impl AgentDefinition {
    pub fn skill(&self, path: &str) -> Option<&SkillDefinition> {
        self.skills.iter().find(|skill| skill.path == path)
    }

    pub fn can_delegate_to(&self, target: &str) -> bool {
        self.delegates_to.iter().any(|name| name == target)
    }
}
