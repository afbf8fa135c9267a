//! Shared scratch storage visible to every agent in a swarm or workflow.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// One scratchpad entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScratchEntry {
    pub content: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    /// Content length in bytes.
    pub size: usize,
}

impl ScratchEntry {
    pub fn new(content: impl Into<String>, title: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            size: content.len(),
            content,
            title: title.into(),
            updated_at: Utc::now(),
        }
    }
}

/// Path-keyed scratch storage.
#[derive(Debug, Clone, Default)]
pub struct Scratchpad {
    entries: Arc<RwLock<BTreeMap<String, ScratchEntry>>>,
}

impl Scratchpad {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite an entry.
    pub fn write(&self, path: impl Into<String>, content: impl Into<String>, title: impl Into<String>) {
        self.entries
            .write()
            .insert(path.into(), ScratchEntry::new(content, title));
    }

    pub fn read(&self, path: &str) -> Option<ScratchEntry> {
        self.entries.read().get(path).cloned()
    }

    pub fn remove(&self, path: &str) -> Option<ScratchEntry> {
        self.entries.write().remove(path)
    }

    /// `(path, title, size)` for every entry, sorted by path.
    pub fn list(&self) -> Vec<(String, String, usize)> {
        self.entries
            .read()
            .iter()
            .map(|(path, entry)| (path.clone(), entry.title.clone(), entry.size))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copy of all entries.
    pub fn export(&self) -> BTreeMap<String, ScratchEntry> {
        self.entries.read().clone()
    }

    /// Insert entries verbatim, timestamps included.
    pub fn import(&self, entries: &BTreeMap<String, ScratchEntry>) {
        let mut guard = self.entries.write();
        for (path, entry) in entries {
            guard.insert(path.clone(), entry.clone());
        }
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_records_size_and_title() {
        let pad = Scratchpad::new();
        pad.write("plan/steps", "1. parse\n2. emit", "Plan");
        let entry = pad.read("plan/steps").unwrap();
        assert_eq!(entry.title, "Plan");
        assert_eq!(entry.size, 16);
        assert_eq!(pad.list(), vec![("plan/steps".to_string(), "Plan".to_string(), 16)]);
    }

    #[test]
    fn import_preserves_timestamps() {
        let source = Scratchpad::new();
        source.write("a", "x", "A");
        let exported = source.export();

        let target = Scratchpad::new();
        target.import(&exported);
        assert_eq!(target.read("a"), exported.get("a").cloned());
    }
}
