//! Per-session context bookkeeping.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{Cost, Usage};

/// Cumulative accounting for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextState {
    /// Cumulative input/output/cached tokens across every transport call.
    #[serde(default)]
    pub usage: Usage,
    /// Cumulative cost in USD, when the model is priced.
    #[serde(default)]
    pub cost: f64,
    /// Context-usage percentages that already emitted a warning.
    #[serde(default)]
    pub warning_thresholds_hit: BTreeSet<u8>,
    #[serde(default)]
    pub compaction_applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_skill_path: Option<String>,
}

impl ContextState {
    pub fn record(&mut self, usage: &Usage, cost: Option<&Cost>) {
        self.usage.merge(usage);
        if let Some(cost) = cost {
            self.cost += cost.total_cost;
        }
    }

    /// Thresholds crossed at `percentage` that have not fired before.
    ///
    /// Each returned threshold is marked as fired.
    pub fn crossed_thresholds(&mut self, percentage: f64, thresholds: &[u8]) -> Vec<u8> {
        let mut sorted: Vec<u8> = thresholds.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        sorted
            .into_iter()
            .filter(|threshold| percentage >= f64::from(*threshold))
            .filter(|threshold| self.warning_thresholds_hit.insert(*threshold))
            .collect()
    }
}

/// Share of the context window used by a single call.
pub fn context_percentage(usage: &Usage, context_window: Option<u64>) -> Option<f64> {
    let window = context_window.filter(|window| *window > 0)?;
    let used = usage.input_tokens + usage.cached_tokens + usage.output_tokens;
    Some(used as f64 * 100.0 / window as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_fire_once() {
        let mut state = ContextState::default();
        assert_eq!(state.crossed_thresholds(65.0, &[90, 60, 80]), vec![60]);
        assert_eq!(state.crossed_thresholds(85.0, &[60, 80, 90]), vec![80]);
        assert!(state.crossed_thresholds(85.0, &[60, 80, 90]).is_empty());
        assert_eq!(state.warning_thresholds_hit.len(), 2);
    }

    #[test]
    fn percentage_requires_a_window() {
        let usage = Usage::new(500, 250);
        assert_eq!(context_percentage(&usage, Some(1000)), Some(75.0));
        assert_eq!(context_percentage(&usage, None), None);
        assert_eq!(context_percentage(&usage, Some(0)), None);
    }
}
