//! Explicit registry of model transports and shared tools.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::SwarmError;
use crate::provider::ModelProvider;
use crate::tools::Tool;

#[derive(Default)]
struct RegistryInner {
    providers: HashMap<String, Arc<dyn ModelProvider>>,
    tools: HashMap<String, Arc<dyn Tool>>,
}

/// Registry mapping provider keys to transports and tool names to tools.
///
/// Constructed by the caller and handed to every swarm or workflow built
/// from it. Agents reference both by name.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport under its own provider name.
    pub fn register_provider(&self, provider: Arc<dyn ModelProvider>) {
        let key = provider.provider_name().to_string();
        self.register_provider_as(key, provider);
    }

    /// Register a transport under an explicit key.
    pub fn register_provider_as(&self, key: impl Into<String>, provider: Arc<dyn ModelProvider>) {
        self.inner.write().providers.insert(key.into(), provider);
    }

    pub fn provider(&self, key: &str) -> Result<Arc<dyn ModelProvider>, SwarmError> {
        self.inner.read().providers.get(key).cloned().ok_or_else(|| {
            SwarmError::config(format!("No model provider registered for '{key}'"))
        })
    }

    pub fn has_provider(&self, key: &str) -> bool {
        self.inner.read().providers.contains_key(key)
    }

    pub fn provider_keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.inner.read().providers.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Register a tool under its own name, replacing any previous one.
    pub fn register_tool(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.inner.write().tools.insert(name, tool);
    }

    pub fn tool(&self, name: &str) -> Result<Arc<dyn Tool>, SwarmError> {
        self.inner
            .read()
            .tools
            .get(name)
            .cloned()
            .ok_or_else(|| SwarmError::ToolNotFound(name.to_string()))
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.inner.read().tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.read().tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop every registered provider and tool.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.providers.clear();
        inner.tools.clear();
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("providers", &self.provider_keys())
            .field("tools", &self.tool_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderRequest, ProviderResponse};
    use crate::tools::{AgentTool, AgentToolParameters};
    use crate::types::Usage;
    use async_trait::async_trait;

    struct StubProvider;

    #[async_trait]
    impl ModelProvider for StubProvider {
        fn provider_name(&self) -> &str {
            "stub"
        }

        async fn send(&self, _request: &ProviderRequest) -> Result<ProviderResponse, SwarmError> {
            Ok(ProviderResponse::text("ok", Usage::default()))
        }
    }

    #[test]
    fn providers_and_tools_resolve_by_name() {
        let registry = Registry::new();
        registry.register_provider(Arc::new(StubProvider));
        registry.register_tool(Arc::new(AgentTool::new(
            "lookup",
            "Look something up",
            AgentToolParameters::empty(),
            |_, _| async { Ok(serde_json::Value::Null) },
        )));

        assert!(registry.provider("stub").is_ok());
        assert!(registry.tool("lookup").is_ok());
        assert!(matches!(registry.tool("missing"), Err(SwarmError::ToolNotFound(_))));
        assert!(matches!(registry.provider("missing"), Err(SwarmError::Configuration(_))));
    }

    #[test]
    fn clear_empties_both_tables() {
        let registry = Registry::new();
        registry.register_provider_as("alias", Arc::new(StubProvider));
        let shared = registry.clone();
        shared.clear();
        assert!(!registry.has_provider("alias"));
        assert!(registry.provider_keys().is_empty());
    }
}
