//! Per-agent read tracking for stale-edit detection.
//!
//! Each agent records a SHA-256 digest of a resource when it reads it. An
//! edit is allowed only while the resource still hashes to the digest that
//! same agent last observed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use crate::error::SwarmError;

/// Hex-encoded SHA-256 of `content`.
pub fn content_digest(content: impl AsRef<[u8]>) -> String {
    let digest = Sha256::digest(content.as_ref());
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Shared `{agent -> {resource -> digest}}` store.
#[derive(Debug, Clone, Default)]
pub struct ReadTracking {
    inner: Arc<RwLock<HashMap<String, HashMap<String, String>>>>,
}

impl ReadTracking {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `agent` read `resource` with the given content.
    ///
    /// Returns the stored digest.
    pub fn record_read(&self, agent: &str, resource: &str, content: impl AsRef<[u8]>) -> String {
        let digest = content_digest(content);
        self.inner
            .write()
            .entry(agent.to_string())
            .or_default()
            .insert(resource.to_string(), digest.clone());
        digest
    }

    /// Digest recorded at `agent`'s last read of `resource`.
    pub fn digest_for(&self, agent: &str, resource: &str) -> Option<String> {
        self.inner.read().get(agent)?.get(resource).cloned()
    }

    /// Check whether `agent` may edit `resource` whose current content is given.
    pub fn check_edit(
        &self,
        agent: &str,
        resource: &str,
        current_content: impl AsRef<[u8]>,
    ) -> Result<(), SwarmError> {
        let Some(recorded) = self.digest_for(agent, resource) else {
            return Err(SwarmError::StaleRead {
                agent: agent.to_string(),
                resource: resource.to_string(),
                reason: "resource has not been read by this agent".to_string(),
            });
        };
        if recorded != content_digest(current_content) {
            tracing::debug!(agent, resource, "edit rejected: resource changed since last read");
            return Err(SwarmError::StaleRead {
                agent: agent.to_string(),
                resource: resource.to_string(),
                reason: "resource was modified since it was last read; read it again".to_string(),
            });
        }
        Ok(())
    }

    /// Sorted copy of every agent that has read at least one resource.
    pub fn export(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        self.inner
            .read()
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(agent, entries)| {
                let entries = entries
                    .iter()
                    .map(|(resource, digest)| (resource.clone(), digest.clone()))
                    .collect();
                (agent.clone(), entries)
            })
            .collect()
    }

    /// Replace the digests recorded for one agent.
    pub fn import_agent(&self, agent: &str, entries: &BTreeMap<String, String>) {
        let entries = entries
            .iter()
            .map(|(resource, digest)| (resource.clone(), digest.clone()))
            .collect();
        self.inner.write().insert(agent.to_string(), entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_hex_sha256() {
        assert_eq!(
            content_digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn edit_allowed_only_against_the_last_read_digest() {
        let tracking = ReadTracking::new();
        tracking.record_read("dev", "src/lib.rs", "v1");

        assert!(tracking.check_edit("dev", "src/lib.rs", "v1").is_ok());

        let err = tracking.check_edit("dev", "src/lib.rs", "v2").unwrap_err();
        assert!(matches!(err, SwarmError::StaleRead { .. }));

        tracking.record_read("dev", "src/lib.rs", "v2");
        assert!(tracking.check_edit("dev", "src/lib.rs", "v2").is_ok());
    }

    #[test]
    fn digests_are_tracked_per_agent() {
        let tracking = ReadTracking::new();
        tracking.record_read("dev", "notes.md", "draft");

        assert!(tracking.check_edit("reviewer", "notes.md", "draft").is_err());
        assert!(tracking.export().contains_key("dev"));
        assert!(!tracking.export().contains_key("reviewer"));
    }
}
