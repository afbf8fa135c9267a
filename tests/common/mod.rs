//! Shared test helpers and mock provider.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use swarmflow::error::SwarmError;
use swarmflow::provider::{ModelProvider, ProviderRequest, ProviderResponse};
use swarmflow::registry::Registry;
use swarmflow::tools::{AgentTool, AgentToolParameters, ToolArguments, ToolExecutionContext};
use swarmflow::types::{AgentToolCall, ModelConfig, Usage};
use swarmflow::AgentDefinition;

pub const PROVIDER: &str = "mock";

/// A mock provider with a response queue per session name.
///
/// When a session's queue is empty it answers `"<session> done: <last message>"`.
#[derive(Default)]
pub struct MockProvider {
    scripts: Mutex<BTreeMap<String, VecDeque<Scripted>>>,
    latency: Mutex<BTreeMap<String, Duration>>,
    calls: Mutex<Vec<String>>,
}

enum Scripted {
    Reply(ProviderResponse),
    Rejected(String),
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a text response for `session`.
    pub fn queue_response(&self, session: &str, text: &str) {
        self.push(session, Scripted::Reply(ProviderResponse::text(text, usage())));
    }

    /// Queue a tool call response for `session`.
    pub fn queue_tool_call(&self, session: &str, id: &str, name: &str, args: Value) {
        let call = AgentToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: args,
        };
        self.push(session, Scripted::Reply(ProviderResponse::tool_calls(vec![call], usage())));
    }

    /// Queue an authentication failure for `session`.
    pub fn queue_auth_failure(&self, session: &str, message: &str) {
        self.push(session, Scripted::Rejected(message.to_string()));
    }

    /// Delay every answer to `session`; `Duration::ZERO` removes the delay.
    pub fn set_latency(&self, session: &str, latency: Duration) {
        self.latency.lock().unwrap().insert(session.to_string(), latency);
    }

    fn push(&self, session: &str, response: Scripted) {
        self.scripts
            .lock()
            .unwrap()
            .entry(session.to_string())
            .or_default()
            .push_back(response);
    }

    /// Sessions that called the provider, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, session: &str) -> usize {
        self.calls().iter().filter(|name| *name == session).count()
    }
}

fn usage() -> Usage {
    Usage::new(10, 20)
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn provider_name(&self) -> &str {
        PROVIDER
    }

    async fn send(&self, request: &ProviderRequest) -> Result<ProviderResponse, SwarmError> {
        self.calls.lock().unwrap().push(request.agent.clone());
        let latency = self.latency.lock().unwrap().get(&request.agent).copied();
        if let Some(latency) = latency.filter(|latency| !latency.is_zero()) {
            tokio::time::sleep(latency).await;
        }
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.agent)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(Scripted::Reply(response)) => Ok(response),
            Some(Scripted::Rejected(message)) => Err(SwarmError::Authentication(message)),
            None => {
                let last = request.messages.last().map(|m| m.text()).unwrap_or_default();
                Ok(ProviderResponse::text(format!("{} done: {last}", request.agent), usage()))
            }
        }
    }
}

/// Registry with `provider` registered under its key.
pub fn registry(provider: &Arc<MockProvider>) -> Registry {
    let registry = Registry::new();
    registry.register_provider(provider.clone());
    registry
}

pub fn agent(name: &str) -> AgentDefinition {
    AgentDefinition::builder()
        .name(name)
        .model(ModelConfig::new(PROVIDER, "mock-1"))
        .system_prompt(format!("You are {name}."))
        .build()
}

pub fn delegating_agent(name: &str, delegates: &[&str]) -> AgentDefinition {
    AgentDefinition::builder()
        .name(name)
        .model(ModelConfig::new(PROVIDER, "mock-1"))
        .system_prompt(format!("You are {name}."))
        .delegates_to(delegates.iter().map(|d| d.to_string()).collect())
        .build()
}

/// `read_file` tool that answers every path with `content` and records the read.
pub fn read_file_tool(content: &'static str) -> Arc<AgentTool> {
    Arc::new(AgentTool::new(
        "read_file",
        "Read a file",
        AgentToolParameters::object().string("path", "File path", true).build(),
        move |args: ToolArguments, ctx: ToolExecutionContext| async move {
            let path = args.get_str("path")?;
            ctx.record_read(path, content);
            Ok::<_, SwarmError>(json!({ "content": content }))
        },
    ))
}

pub fn reading_agent(name: &str) -> AgentDefinition {
    AgentDefinition::builder()
        .name(name)
        .model(ModelConfig::new(PROVIDER, "mock-1"))
        .system_prompt(format!("You are {name}."))
        .tools(vec!["read_file".to_string()])
        .build()
}
