//! Language-model transport interface.
//!
//! The orchestration layer never talks HTTP itself. Concrete transports
//! implement [`ModelProvider`] and are registered by provider key in a
//! [`Registry`](crate::registry::Registry).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SwarmError;
use crate::types::{AgentToolCall, ModelConfig, ModelMessage, Usage};

/// A request sent to a model transport.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// Name of the agent session issuing the call.
    pub agent: String,
    pub messages: Vec<ModelMessage>,
    pub tools: Vec<ToolDefinition>,
    pub model: ModelConfig,
}

/// Tool schema advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Response from a transport.
#[derive(Debug, Clone, Default)]
pub struct ProviderResponse {
    pub content: String,
    pub tool_calls: Vec<AgentToolCall>,
    pub usage: Usage,
}

impl ProviderResponse {
    /// A final text answer.
    pub fn text(content: impl Into<String>, usage: Usage) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            usage,
        }
    }

    /// A response requesting tool calls.
    pub fn tool_calls(calls: Vec<AgentToolCall>, usage: Usage) -> Self {
        Self {
            content: String::new(),
            tool_calls: calls,
            usage,
        }
    }
}

/// Core trait implemented by model transports.
///
/// Errors should be mapped onto the transport variants of [`SwarmError`]
/// (`Api`, `Authentication`, `RateLimited`, `Network`) so the session's
/// retry loop can classify them.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider key (e.g. "anthropic", "openai").
    fn provider_name(&self) -> &str;

    /// Send the conversation and tool schemas, returning one model turn.
    async fn send(&self, request: &ProviderRequest) -> Result<ProviderResponse, SwarmError>;
}
