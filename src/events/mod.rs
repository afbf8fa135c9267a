//! Orchestration event stream.
//!
//! Subscribers live in task-local storage: a run installs its callbacks with
//! [`scope`], every emit inside that future (nested delegations and node
//! executions included) reaches them, and unrelated concurrent runs never
//! see each other's events. Tasks started with [`spawn`] inherit the
//! spawning task's subscribers.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::TimeoutScope;
use crate::types::{Cost, Usage};

/// Callback invoked for every event emitted inside its scope.
pub type EventCallback = Arc<dyn Fn(&OrchestrationEvent) + Send + Sync>;

tokio::task_local! {
    static SUBSCRIBERS: Subscribers;
}

/// Ordered list of callbacks attached to a task tree.
#[derive(Clone, Default)]
pub struct Subscribers {
    callbacks: Vec<EventCallback>,
}

impl Subscribers {
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("count", &self.callbacks.len())
            .finish()
    }
}

/// Subscribers of the current task, empty outside any scope.
pub fn current() -> Subscribers {
    SUBSCRIBERS.try_with(Clone::clone).unwrap_or_default()
}

/// Run `future` with the current subscribers plus `extra`.
pub async fn scope<F: Future>(extra: Vec<EventCallback>, future: F) -> F::Output {
    let mut subscribers = current();
    subscribers.callbacks.extend(extra);
    SUBSCRIBERS.scope(subscribers, future).await
}

/// Spawn a task that inherits the current subscribers.
pub fn spawn<F>(future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(SUBSCRIBERS.scope(current(), future))
}

/// Deliver an event to every subscriber of the current task, in
/// registration order.
pub fn emit(event: OrchestrationEvent) {
    tracing::debug!(
        event = event.kind.name(),
        agent = event.agent.as_deref().unwrap_or(""),
        node = event.node.as_deref().unwrap_or(""),
        swarm_id = event.swarm_id.as_deref().unwrap_or(""),
        "orchestration event"
    );
    let _ = SUBSCRIBERS.try_with(|subscribers| {
        for callback in &subscribers.callbacks {
            callback(&event);
        }
    });
}

/// Collects events into an ordered log.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<OrchestrationEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> EventCallback {
        let events = self.events.clone();
        Arc::new(move |event: &OrchestrationEvent| events.lock().push(event.clone()))
    }

    /// Drain the collected events.
    pub fn take(&self) -> Vec<OrchestrationEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

/// Where an event originated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventOrigin {
    pub swarm_id: Option<String>,
    pub parent_swarm_id: Option<String>,
    pub node: Option<String>,
}

impl EventOrigin {
    pub fn event(&self, kind: EventKind, agent: Option<&str>) -> OrchestrationEvent {
        OrchestrationEvent {
            timestamp: Utc::now(),
            agent: agent.map(str::to_string),
            node: self.node.clone(),
            swarm_id: self.swarm_id.clone(),
            parent_swarm_id: self.parent_swarm_id.clone(),
            kind,
        }
    }

    pub fn emit(&self, kind: EventKind, agent: Option<&str>) {
        emit(self.event(kind, agent));
    }
}

/// A structured orchestration event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swarm_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_swarm_id: Option<String>,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Event payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    SwarmStart {
        prompt: String,
    },
    SwarmStop {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    WorkflowStart {
        prompt: String,
        start_node: String,
    },
    WorkflowStop {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        halted_at: Option<String>,
    },
    NodeStart {
        dependencies: Vec<String>,
    },
    NodeStop {
        skipped: bool,
        success: bool,
        duration_ms: u64,
    },
    NodeRedirected {
        target: String,
    },
    WorkflowHalted {
        content: String,
    },
    DelegationStart {
        target: String,
        caller: String,
        message: String,
    },
    DelegationComplete {
        target: String,
        caller: String,
        success: bool,
        duration_ms: u64,
    },
    CircularDependency {
        chain: Vec<String>,
    },
    AgentStep {
        usage: Usage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cost: Option<Cost>,
        tool_calls: usize,
    },
    AgentStop {
        content: String,
    },
    ToolCall {
        tool: String,
        call_id: String,
        arguments: serde_json::Value,
    },
    ToolResult {
        tool: String,
        call_id: String,
        is_error: bool,
    },
    TurnRetry {
        attempt: u32,
        error: String,
    },
    Timeout {
        scope: TimeoutScope,
        after_ms: u64,
    },
    ContextWarning {
        threshold: u8,
        percentage: f64,
    },
    CompactionApplied {
        removed_messages: usize,
    },
}

impl EventKind {
    /// Wire name of the event type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SwarmStart { .. } => "swarm_start",
            Self::SwarmStop { .. } => "swarm_stop",
            Self::WorkflowStart { .. } => "workflow_start",
            Self::WorkflowStop { .. } => "workflow_stop",
            Self::NodeStart { .. } => "node_start",
            Self::NodeStop { .. } => "node_stop",
            Self::NodeRedirected { .. } => "node_redirected",
            Self::WorkflowHalted { .. } => "workflow_halted",
            Self::DelegationStart { .. } => "delegation_start",
            Self::DelegationComplete { .. } => "delegation_complete",
            Self::CircularDependency { .. } => "circular_dependency",
            Self::AgentStep { .. } => "agent_step",
            Self::AgentStop { .. } => "agent_stop",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::TurnRetry { .. } => "turn_retry",
            Self::Timeout { .. } => "timeout",
            Self::ContextWarning { .. } => "context_warning",
            Self::CompactionApplied { .. } => "compaction_applied",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop_event() -> OrchestrationEvent {
        EventOrigin::default().event(
            EventKind::AgentStop {
                content: "done".into(),
            },
            Some("lead"),
        )
    }

    #[tokio::test]
    async fn emit_outside_scope_is_a_noop() {
        emit(stop_event());
        assert!(current().is_empty());
    }

    #[tokio::test]
    async fn nested_scopes_inherit_parent_subscribers() {
        let outer = EventLog::new();
        let inner = EventLog::new();
        let inner_cb = inner.callback();

        scope(vec![outer.callback()], async move {
            emit(stop_event());
            scope(vec![inner_cb], async {
                assert_eq!(current().len(), 2);
                emit(stop_event());
            })
            .await;
        })
        .await;

        assert_eq!(outer.take().len(), 2);
        assert_eq!(inner.take().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_scopes_do_not_cross() {
        let a = EventLog::new();
        let b = EventLog::new();
        let (a_cb, b_cb) = (a.callback(), b.callback());

        let first = tokio::spawn(scope(vec![a_cb], async {
            emit(stop_event());
        }));
        let second = tokio::spawn(scope(vec![b_cb], async {
            emit(stop_event());
            emit(stop_event());
        }));
        first.await.unwrap();
        second.await.unwrap();

        assert_eq!(a.take().len(), 1);
        assert_eq!(b.take().len(), 2);
    }

    #[tokio::test]
    async fn spawned_children_inherit_subscribers() {
        let log = EventLog::new();
        scope(vec![log.callback()], async {
            spawn(async { emit(stop_event()) }).await.unwrap();
        })
        .await;
        assert_eq!(log.take().len(), 1);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(stop_event()).unwrap();
        assert_eq!(json["type"], "agent_stop");
        assert_eq!(json["agent"], "lead");
        assert!(json.get("node").is_none());
    }
}
