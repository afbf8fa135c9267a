//! Declarative swarm shape: agents, lead, and registered sub-swarms.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::agent::AgentDefinition;
use crate::error::SwarmError;
use crate::registry::Registry;

fn default_true() -> bool {
    true
}

/// A delegation graph: a lead agent, its peers, and nested swarms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmDefinition {
    /// Identity of a root swarm; defaults to the lead's name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    pub lead: String,
    pub agents: Vec<AgentDefinition>,
    #[serde(default)]
    pub sub_swarms: Vec<SubSwarmDefinition>,
}

/// A nested swarm registered under a name in its parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubSwarmDefinition {
    pub name: String,
    /// Keep the nested sessions between delegations into it.
    #[serde(default = "default_true")]
    pub keep_context: bool,
    pub swarm: SwarmDefinition,
}

impl SwarmDefinition {
    pub fn new(lead: impl Into<String>, agents: Vec<AgentDefinition>) -> Self {
        Self {
            name: None,
            description: String::new(),
            lead: lead.into(),
            agents,
            sub_swarms: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Register a nested swarm reachable by delegating to `name`.
    pub fn with_sub_swarm(mut self, name: impl Into<String>, swarm: SwarmDefinition, keep_context: bool) -> Self {
        self.sub_swarms.push(SubSwarmDefinition {
            name: name.into(),
            keep_context,
            swarm,
        });
        self
    }

    pub fn agent(&self, name: &str) -> Option<&AgentDefinition> {
        self.agents.iter().find(|agent| agent.name == name)
    }

    pub fn sub_swarm(&self, name: &str) -> Option<&SubSwarmDefinition> {
        self.sub_swarms.iter().find(|sub| sub.name == name)
    }

    /// Check the graph shape, recursing into sub-swarms.
    pub fn validate(&self) -> Result<(), SwarmError> {
        let mut names = BTreeSet::new();
        for agent in &self.agents {
            validate_name("agent", &agent.name)?;
            if !names.insert(agent.name.as_str()) {
                return Err(SwarmError::config(format!("agent '{}' is defined twice", agent.name)));
            }
        }
        if !names.contains(self.lead.as_str()) {
            return Err(SwarmError::config(format!(
                "lead agent '{}' is not defined",
                self.lead
            )));
        }

        let mut sub_names = BTreeSet::new();
        for sub in &self.sub_swarms {
            validate_name("sub-swarm", &sub.name)?;
            if !sub_names.insert(sub.name.as_str()) {
                return Err(SwarmError::config(format!(
                    "sub-swarm '{}' is registered twice",
                    sub.name
                )));
            }
            sub.swarm.validate().map_err(|err| {
                SwarmError::config(format!("in sub-swarm '{}': {err}", sub.name))
            })?;
        }

        for agent in &self.agents {
            for target in &agent.delegates_to {
                if target == &agent.name {
                    return Err(SwarmError::config(format!(
                        "agent '{}' cannot delegate to itself",
                        agent.name
                    )));
                }
                if !names.contains(target.as_str()) && !sub_names.contains(target.as_str()) {
                    return Err(SwarmError::config(format!(
                        "agent '{}' delegates to undefined target '{target}'",
                        agent.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Check that every provider and tool the graph names is registered.
    pub fn check_registry(&self, registry: &Registry) -> Result<(), SwarmError> {
        for agent in &self.agents {
            if !registry.has_provider(&agent.model.provider) {
                return Err(SwarmError::config(format!(
                    "agent '{}' uses unregistered provider '{}'",
                    agent.name, agent.model.provider
                )));
            }
            if let Some(tool) = agent.tools.iter().find(|tool| !registry.has_tool(tool)) {
                return Err(SwarmError::config(format!(
                    "agent '{}' declares unregistered tool '{tool}'",
                    agent.name
                )));
            }
        }
        self.sub_swarms
            .iter()
            .try_for_each(|sub| sub.swarm.check_registry(registry))
    }
}

fn validate_name(kind: &str, name: &str) -> Result<(), SwarmError> {
    if name.is_empty() || name.contains(['@', '/']) {
        return Err(SwarmError::config(format!(
            "{kind} name '{name}' must be non-empty and contain neither '@' nor '/'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModelConfig;

    fn agent(name: &str, delegates: &[&str]) -> AgentDefinition {
        AgentDefinition::builder()
            .name(name)
            .model(ModelConfig::new("mock", "m"))
            .delegates_to(delegates.iter().map(|d| d.to_string()).collect())
            .build()
    }

    #[test]
    fn accepts_delegation_to_agents_and_sub_swarms() {
        let research = SwarmDefinition::new("searcher", vec![agent("searcher", &[])]);
        let def = SwarmDefinition::new("lead", vec![agent("lead", &["backend", "research"]), agent("backend", &["lead"])])
            .with_sub_swarm("research", research, true);
        assert!(def.validate().is_ok());
    }

    #[test]
    fn rejects_undefined_lead_and_targets() {
        let err = SwarmDefinition::new("ghost", vec![agent("lead", &[])]).validate().unwrap_err();
        assert!(err.to_string().contains("lead agent 'ghost'"));

        let err = SwarmDefinition::new("lead", vec![agent("lead", &["nobody"])])
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("undefined target 'nobody'"));
    }

    #[test]
    fn rejects_reserved_characters_in_names() {
        let err = SwarmDefinition::new("a@b", vec![agent("a@b", &[])]).validate().unwrap_err();
        assert!(matches!(err, SwarmError::Configuration(_)));
    }

    #[test]
    fn nested_errors_name_the_sub_swarm() {
        let broken = SwarmDefinition::new("missing", vec![agent("searcher", &[])]);
        let err = SwarmDefinition::new("lead", vec![agent("lead", &[])])
            .with_sub_swarm("research", broken, false)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("in sub-swarm 'research'"));
    }
}
