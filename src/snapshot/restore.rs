use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::Display;

use super::{SessionSnapshot, Snapshot, SnapshotTarget};
use crate::error::SwarmError;
use crate::swarm::parse_instance_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RestoreWarningKind {
    AgentNotFound,
    DelegationInstanceNotRestorable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreWarning {
    pub kind: RestoreWarningKind,
    /// Agent name or `delegate@caller` key.
    pub name: String,
    pub message: String,
}

/// What a restore applied and what it had to leave out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreResult {
    pub success: bool,
    pub partial_restore: bool,
    pub warnings: Vec<RestoreWarning>,
    pub skipped_agents: Vec<String>,
    pub skipped_delegations: Vec<String>,
}

impl RestoreResult {
    fn skip_agent(&mut self, name: &str) {
        self.warnings.push(RestoreWarning {
            kind: RestoreWarningKind::AgentNotFound,
            name: name.to_string(),
            message: format!("agent '{name}' is not part of the live orchestration"),
        });
        self.skipped_agents.push(name.to_string());
    }

    fn skip_delegation(&mut self, key: &str) {
        self.warnings.push(RestoreWarning {
            kind: RestoreWarningKind::DelegationInstanceNotRestorable,
            name: key.to_string(),
            message: format!("delegation instance '{key}' cannot exist in the live orchestration"),
        });
        self.skipped_delegations.push(key.to_string());
    }

    fn is_skipped(&self, name: &str) -> bool {
        self.skipped_agents.iter().any(|n| n == name) || self.skipped_delegations.iter().any(|k| k == name)
    }
}

/// Replay `snapshot` into a freshly built `target`.
///
/// Every entry is classified before anything is mutated; entries with no
/// counterpart are reported as warnings instead of failing the restore.
/// Restore before running the target: sessions created by a run carry
/// history the snapshot overwrites.
pub async fn restore<T: SnapshotTarget + ?Sized>(target: &T, snapshot: &Snapshot) -> Result<RestoreResult, SwarmError> {
    if snapshot.kind != target.snapshot_kind() {
        return Err(SwarmError::Snapshot(format!(
            "cannot restore a {} snapshot into a {}",
            snapshot.kind,
            target.snapshot_kind()
        )));
    }

    let mut result = RestoreResult::default();
    let mut agents: Vec<(&String, &SessionSnapshot)> = Vec::new();
    for (name, state) in &snapshot.agents {
        if target.accepts_agent(name) {
            agents.push((name, state));
        } else {
            result.skip_agent(name);
        }
    }
    let mut instances: Vec<(&String, &SessionSnapshot)> = Vec::new();
    for (key, state) in &snapshot.delegation_instances {
        if target.accepts_delegation_instance(key) {
            instances.push((key, state));
        } else {
            result.skip_delegation(key);
        }
    }
    let mut tracked = BTreeSet::new();
    for name in snapshot.read_tracking.keys() {
        if result.is_skipped(name) {
            continue;
        }
        if target.tracks_reads_for(name) {
            tracked.insert(name.as_str());
        } else if parse_instance_key(name).is_some() {
            result.skip_delegation(name);
        } else {
            result.skip_agent(name);
        }
    }

    for (name, state) in agents {
        let handle = target.agent_session(name)?;
        handle
            .lock()
            .await
            .restore_state(state.conversation.clone(), state.context_state.clone());
    }
    for (key, state) in instances {
        let handle = target.delegation_instance(key)?;
        handle
            .lock()
            .await
            .restore_state(state.conversation.clone(), state.context_state.clone());
    }
    target.scratchpad().import(&snapshot.scratchpad);
    for (name, entries) in &snapshot.read_tracking {
        if tracked.contains(name.as_str()) {
            target.read_tracking().import_agent(name, entries);
        }
    }

    result.success = result.warnings.is_empty();
    result.partial_restore = !result.success;
    if result.partial_restore {
        tracing::warn!(
            kind = %snapshot.kind,
            skipped_agents = ?result.skipped_agents,
            skipped_delegations = ?result.skipped_delegations,
            "Snapshot partially restored"
        );
    } else {
        tracing::debug!(kind = %snapshot.kind, agents = snapshot.agents.len(), "Snapshot restored");
    }
    Ok(result)
}
