//! Per-agent tool collection with skill-restricted modes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::tool::Tool;
use crate::provider::ToolDefinition;

/// A named, restricted operating mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillDefinition {
    /// Identifier recorded in context state and snapshots.
    pub path: String,
    /// Removable tools that stay active while the skill is engaged.
    #[serde(default)]
    pub tools: Vec<String>,
}

/// Which tools are currently active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolMode {
    /// Every registered tool is active.
    Unrestricted,
    /// Only the listed tools plus the always-available ones are active.
    Restricted {
        skill_path: String,
        allowed: BTreeSet<String>,
    },
}

#[derive(Default)]
struct ToolSetInner {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    always_available: BTreeSet<String>,
    mode: Option<ToolMode>,
}

/// Tools partitioned into always-available and removable ones.
///
/// The active subset is computed on demand from the current [`ToolMode`];
/// engaging a skill never removes anything from the collection itself.
#[derive(Clone, Default)]
pub struct ToolSet {
    inner: Arc<RwLock<ToolSetInner>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a removable tool. A tool with the same name is replaced.
    pub fn add(&self, tool: Arc<dyn Tool>) {
        let mut inner = self.inner.write();
        let name = tool.name().to_string();
        inner.always_available.remove(&name);
        inner.tools.insert(name, tool);
    }

    /// Register a tool that stays active in every mode.
    pub fn add_always_available(&self, tool: Arc<dyn Tool>) {
        let mut inner = self.inner.write();
        let name = tool.name().to_string();
        inner.always_available.insert(name.clone());
        inner.tools.insert(name, tool);
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let mut inner = self.inner.write();
        inner.always_available.remove(name);
        inner.tools.remove(name)
    }

    pub fn mode(&self) -> ToolMode {
        self.inner
            .read()
            .mode
            .clone()
            .unwrap_or(ToolMode::Unrestricted)
    }

    /// Path of the engaged skill, if any.
    pub fn active_skill_path(&self) -> Option<String> {
        match self.mode() {
            ToolMode::Unrestricted => None,
            ToolMode::Restricted { skill_path, .. } => Some(skill_path),
        }
    }

    /// Engage a skill: restrict the active set to its tools.
    pub fn activate_skill(&self, skill: &SkillDefinition) {
        self.inner.write().mode = Some(ToolMode::Restricted {
            skill_path: skill.path.clone(),
            allowed: skill.tools.iter().cloned().collect(),
        });
    }

    /// Return to unrestricted mode.
    pub fn deactivate_skill(&self) {
        self.inner.write().mode = None;
    }

    fn is_active(inner: &ToolSetInner, name: &str) -> bool {
        if inner.always_available.contains(name) {
            return true;
        }
        match &inner.mode {
            None | Some(ToolMode::Unrestricted) => true,
            Some(ToolMode::Restricted { allowed, .. }) => allowed.contains(name),
        }
    }

    /// Look up an active tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let inner = self.inner.read();
        if !Self::is_active(&inner, name) {
            return None;
        }
        inner.tools.get(name).cloned()
    }

    /// Names of the currently active tools, sorted.
    pub fn active_names(&self) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .tools
            .keys()
            .filter(|name| Self::is_active(&inner, name))
            .cloned()
            .collect()
    }

    /// Schemas of the currently active tools.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let inner = self.inner.read();
        inner
            .tools
            .iter()
            .filter(|(name, _)| Self::is_active(&inner, name))
            .map(|(_, tool)| tool.definition())
            .collect()
    }

    /// Every registered tool name, active or not.
    pub fn all_names(&self) -> Vec<String> {
        self.inner.read().tools.keys().cloned().collect()
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("ToolSet")
            .field("tools", &inner.tools.keys().collect::<Vec<_>>())
            .field("always_available", &inner.always_available)
            .field("mode", &inner.mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{AgentTool, AgentToolParameters};

    fn noop(name: &str) -> Arc<dyn Tool> {
        Arc::new(AgentTool::new(
            name,
            "noop",
            AgentToolParameters::empty(),
            |_, _| async { Ok(serde_json::Value::Null) },
        ))
    }

    fn toolset() -> ToolSet {
        let set = ToolSet::new();
        set.add_always_available(noop("scratchpad_read"));
        set.add(noop("bash"));
        set.add(noop("edit"));
        set.add(noop("grep"));
        set
    }

    #[test]
    fn unrestricted_mode_exposes_everything() {
        let set = toolset();
        assert_eq!(set.active_names(), vec!["bash", "edit", "grep", "scratchpad_read"]);
        assert_eq!(set.active_skill_path(), None);
    }

    #[test]
    fn skill_restricts_removable_tools_only() {
        let set = toolset();
        set.activate_skill(&SkillDefinition {
            path: "skills/search".into(),
            tools: vec!["grep".into()],
        });

        assert_eq!(set.active_names(), vec!["grep", "scratchpad_read"]);
        assert!(set.get("bash").is_none());
        assert!(set.get("scratchpad_read").is_some());
        assert_eq!(set.active_skill_path().as_deref(), Some("skills/search"));
        assert_eq!(set.all_names().len(), 4);

        set.deactivate_skill();
        assert!(set.get("bash").is_some());
        assert_eq!(set.mode(), ToolMode::Unrestricted);
    }
}
