use super::{SessionSnapshot, Snapshot, SnapshotTarget};
use crate::agent::SessionHandle;

async fn session_snapshot(handle: &SessionHandle) -> SessionSnapshot {
    let session = handle.lock().await;
    SessionSnapshot {
        conversation: session.messages().to_vec(),
        context_state: session.context_state(),
    }
}

/// Record every materialized session, the scratchpad, and read tracking.
///
/// Sessions are locked one at a time; capture a target while no run is
/// in flight to get a consistent picture.
pub async fn capture<T: SnapshotTarget + ?Sized>(target: &T) -> Snapshot {
    let mut snapshot = Snapshot::empty(target.snapshot_kind());

    for (name, handle) in target.agent_sessions() {
        let captured = session_snapshot(&handle).await;
        snapshot.agents.insert(name, captured);
    }
    for (key, handle) in target.delegation_instances() {
        let captured = session_snapshot(&handle).await;
        snapshot.delegation_instances.insert(key, captured);
    }
    snapshot.scratchpad = target.scratchpad().export();
    snapshot.read_tracking = target.read_tracking().export();

    tracing::debug!(
        kind = %snapshot.kind,
        agents = snapshot.agents.len(),
        delegation_instances = snapshot.delegation_instances.len(),
        scratch_entries = snapshot.scratchpad.len(),
        "Snapshot captured"
    );
    snapshot
}
