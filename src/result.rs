//! Outcome of a swarm invocation, a delegation, or a workflow node.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SwarmError;
use crate::events::{EventKind, OrchestrationEvent};
use crate::types::Usage;

/// One agent answer in the order it was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub agent: String,
    pub content: String,
}

/// Structured outcome; failures are carried in `error`, never raised.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub content: String,
    /// Agent that produced `content`, if any.
    pub agent: Option<String>,
    pub duration: Duration,
    pub error: Option<String>,
    /// The body was bypassed by a skip directive.
    pub skipped: bool,
    /// This result ended the run through a halt directive.
    pub halted: bool,
    /// Events observed while producing this result, in emission order.
    pub logs: Vec<OrchestrationEvent>,
}

impl ExecutionResult {
    pub fn completed(content: impl Into<String>, agent: Option<String>) -> Self {
        Self {
            content: content.into(),
            agent,
            ..Default::default()
        }
    }

    pub fn failure(error: &SwarmError, agent: Option<String>) -> Self {
        Self {
            agent,
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    pub fn skipped(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            skipped: true,
            ..Default::default()
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_logs(mut self, logs: Vec<OrchestrationEvent>) -> Self {
        self.logs = logs;
        self
    }

    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    /// Summed usage of every transport call in the log.
    pub fn total_usage(&self) -> Usage {
        let mut total = Usage::default();
        for event in &self.logs {
            if let EventKind::AgentStep { usage, .. } = &event.kind {
                total.merge(usage);
            }
        }
        total
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_usage().total_tokens()
    }

    /// Summed cost in USD of every priced transport call in the log.
    pub fn total_cost(&self) -> f64 {
        self.logs
            .iter()
            .filter_map(|event| match &event.kind {
                EventKind::AgentStep { cost: Some(cost), .. } => Some(cost.total_cost),
                _ => None,
            })
            .sum()
    }

    /// Agents that emitted events, in first-seen order.
    pub fn agents_involved(&self) -> Vec<String> {
        let mut agents: Vec<String> = Vec::new();
        for agent in self.logs.iter().filter_map(|event| event.agent.as_ref()) {
            if !agents.contains(agent) {
                agents.push(agent.clone());
            }
        }
        agents
    }

    /// Final answers of every agent turn, delegated turns included.
    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.logs
            .iter()
            .filter_map(|event| match (&event.kind, &event.agent) {
                (EventKind::AgentStop { content }, Some(agent)) => Some(TranscriptEntry {
                    agent: agent.clone(),
                    content: content.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}
