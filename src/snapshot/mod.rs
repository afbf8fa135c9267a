//! Versioned captures of a swarm's or workflow's conversational state.

mod capture;
mod restore;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub use capture::capture;
pub use restore::{restore, RestoreResult, RestoreWarning, RestoreWarningKind};

use crate::agent::{ContextState, SessionHandle};
use crate::error::SwarmError;
use crate::read_tracking::ReadTracking;
use crate::scratchpad::{ScratchEntry, Scratchpad};
use crate::swarm::Swarm;
use crate::types::ModelMessage;
use crate::workflow::Workflow;

/// Schema version written into every snapshot.
pub const SNAPSHOT_VERSION: &str = "1.0.0";

/// Which orchestration mode produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SnapshotKind {
    Swarm,
    Workflow,
}

/// Conversation and bookkeeping of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub conversation: Vec<ModelMessage>,
    #[serde(default)]
    pub context_state: ContextState,
}

/// Everything needed to resume an orchestration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: String,
    pub kind: SnapshotKind,
    pub created_at: DateTime<Utc>,
    pub orchestrator_version: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub agents: BTreeMap<String, SessionSnapshot>,
    /// Keyed `delegate@caller`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub delegation_instances: BTreeMap<String, SessionSnapshot>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scratchpad: BTreeMap<String, ScratchEntry>,
    /// `{session -> {resource -> digest}}`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub read_tracking: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Snapshot {
    pub(crate) fn empty(kind: SnapshotKind) -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            kind,
            created_at: Utc::now(),
            orchestrator_version: env!("CARGO_PKG_VERSION").to_string(),
            agents: BTreeMap::new(),
            delegation_instances: BTreeMap::new(),
            scratchpad: BTreeMap::new(),
            read_tracking: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn to_json(&self) -> Result<String, SwarmError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a serialized snapshot, rejecting an incompatible schema.
    pub fn from_json(json: &str) -> Result<Self, SwarmError> {
        let snapshot: Self = serde_json::from_str(json)?;
        if major(&snapshot.version) != major(SNAPSHOT_VERSION) {
            return Err(SwarmError::Snapshot(format!(
                "unsupported snapshot version {} (expected {}.x)",
                snapshot.version,
                major(SNAPSHOT_VERSION)
            )));
        }
        Ok(snapshot)
    }
}

fn major(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

/// An orchestration whose state can be captured and restored.
///
/// Implemented by [`crate::Swarm`] and [`crate::Workflow`]. Sessions inside
/// a sub-swarm are keyed by their path, `research/lead` or
/// `research/backend@lead`, the same keys their read tracking uses.
pub trait SnapshotTarget {
    fn snapshot_kind(&self) -> SnapshotKind;

    /// Named sessions materialized so far, by key.
    fn agent_sessions(&self) -> Vec<(String, SessionHandle)>;

    /// Delegation instances materialized so far, by `delegate@caller` key.
    fn delegation_instances(&self) -> Vec<(String, SessionHandle)>;

    fn scratchpad(&self) -> &Scratchpad;

    fn read_tracking(&self) -> &ReadTracking;

    /// Whether a captured agent session has a home in this target.
    fn accepts_agent(&self, name: &str) -> bool;

    fn accepts_delegation_instance(&self, key: &str) -> bool;

    /// Whether read-tracking entries recorded by `owner` belong here.
    fn tracks_reads_for(&self, owner: &str) -> bool {
        self.accepts_agent(owner) || self.accepts_delegation_instance(owner)
    }

    /// Session to overwrite for an accepted agent, created if needed.
    fn agent_session(&self, name: &str) -> Result<SessionHandle, SwarmError>;

    fn delegation_instance(&self, key: &str) -> Result<SessionHandle, SwarmError>;
}

fn nested_owner<'a>(swarm: &Swarm, path: &'a str) -> Option<(Swarm, &'a str)> {
    swarm.owner_of(path).ok().flatten()
}

fn prefixed(prefix: &str, entries: Vec<(String, SessionHandle)>) -> impl Iterator<Item = (String, SessionHandle)> + '_ {
    entries
        .into_iter()
        .map(move |(key, handle)| (format!("{prefix}/{key}"), handle))
}

/// Classifying a nested key builds the sub-swarm shells it walks through;
/// they hold no sessions until something is restored into them.
impl SnapshotTarget for Swarm {
    fn snapshot_kind(&self) -> SnapshotKind {
        SnapshotKind::Swarm
    }

    fn agent_sessions(&self) -> Vec<(String, SessionHandle)> {
        let mut sessions: Vec<_> = self
            .sessions()
            .into_iter()
            .map(|handle| (handle.name().to_string(), handle))
            .collect();
        for (name, sub) in self.sub_swarms() {
            sessions.extend(prefixed(&name, SnapshotTarget::agent_sessions(&sub)));
        }
        sessions
    }

    fn delegation_instances(&self) -> Vec<(String, SessionHandle)> {
        let mut instances = self.instances();
        for (name, sub) in self.sub_swarms() {
            instances.extend(prefixed(&name, SnapshotTarget::delegation_instances(&sub)));
        }
        instances
    }

    fn scratchpad(&self) -> &Scratchpad {
        Swarm::scratchpad(self)
    }

    fn read_tracking(&self) -> &ReadTracking {
        Swarm::read_tracking(self)
    }

    fn accepts_agent(&self, name: &str) -> bool {
        nested_owner(self, name).is_some_and(|(owner, leaf)| owner.is_top_level(leaf))
    }

    fn accepts_delegation_instance(&self, key: &str) -> bool {
        nested_owner(self, key).is_some_and(|(owner, leaf)| owner.accepts_instance(leaf))
    }

    fn agent_session(&self, name: &str) -> Result<SessionHandle, SwarmError> {
        let (owner, leaf) = self
            .owner_of(name)?
            .ok_or_else(|| SwarmError::InvalidArgument(format!("no sub-swarm owns session '{name}'")))?;
        owner.session(leaf)
    }

    fn delegation_instance(&self, key: &str) -> Result<SessionHandle, SwarmError> {
        let (owner, leaf) = self
            .owner_of(key)?
            .ok_or_else(|| SwarmError::InvalidArgument(format!("no sub-swarm owns instance '{key}'")))?;
        owner.instance(leaf)
    }
}

/// Workflows capture the sessions of agents that keep context across
/// nodes; node-local sessions and their delegation instances end with
/// the node, but their reads stay tracked under `node/session`.
impl SnapshotTarget for Workflow {
    fn snapshot_kind(&self) -> SnapshotKind {
        SnapshotKind::Workflow
    }

    fn agent_sessions(&self) -> Vec<(String, SessionHandle)> {
        self.persistent_sessions()
            .into_iter()
            .map(|handle| (handle.name().to_string(), handle))
            .collect()
    }

    fn delegation_instances(&self) -> Vec<(String, SessionHandle)> {
        Vec::new()
    }

    fn scratchpad(&self) -> &Scratchpad {
        Workflow::scratchpad(self)
    }

    fn read_tracking(&self) -> &ReadTracking {
        Workflow::read_tracking(self)
    }

    fn accepts_agent(&self, name: &str) -> bool {
        self.is_persistent_agent(name)
    }

    fn accepts_delegation_instance(&self, _key: &str) -> bool {
        false
    }

    fn tracks_reads_for(&self, owner: &str) -> bool {
        match owner.split_once('/') {
            Some((node, key)) => self.has_node_session(node, key),
            None => self.is_persistent_agent(owner),
        }
    }

    fn agent_session(&self, name: &str) -> Result<SessionHandle, SwarmError> {
        self.persistent_session(name)
    }

    fn delegation_instance(&self, key: &str) -> Result<SessionHandle, SwarmError> {
        Err(SwarmError::InvalidArgument(format!(
            "workflow '{}' keeps no delegation instance '{key}'",
            self.name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_sections_are_omitted() {
        let json = Snapshot::empty(SnapshotKind::Swarm).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["kind"], "swarm");
        assert!(value.get("agents").is_none());
        assert!(value.get("scratchpad").is_none());
        assert_eq!(value["orchestrator_version"], env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn parse_rejects_other_major_versions() {
        let mut snapshot = Snapshot::empty(SnapshotKind::Workflow).with_metadata("run", serde_json::json!(7));
        let parsed = Snapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(parsed, snapshot);

        snapshot.version = "1.4.2".into();
        assert!(Snapshot::from_json(&snapshot.to_json().unwrap()).is_ok());

        snapshot.version = "2.0.0".into();
        let err = Snapshot::from_json(&snapshot.to_json().unwrap()).unwrap_err();
        assert!(matches!(err, SwarmError::Snapshot(_)));
    }
}
