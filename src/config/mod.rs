//! Orchestration configuration (layered: defaults < TOML file < env).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SwarmError;
use crate::util::retry::RetryPolicy;

const ENV_RUN_TIMEOUT_SECS: &str = "SWARMFLOW_RUN_TIMEOUT_SECS";
const ENV_TURN_TIMEOUT_SECS: &str = "SWARMFLOW_TURN_TIMEOUT_SECS";
const ENV_MAX_TOOL_ITERATIONS: &str = "SWARMFLOW_MAX_TOOL_ITERATIONS";
const ENV_MAX_RETRY_ATTEMPTS: &str = "SWARMFLOW_MAX_RETRY_ATTEMPTS";
const ENV_MAX_NODE_EXECUTIONS: &str = "SWARMFLOW_MAX_NODE_EXECUTIONS";

const DEFAULT_RUN_TIMEOUT_SECS: u64 = 1800;
const DEFAULT_TURN_TIMEOUT_SECS: u64 = 300;
const DEFAULT_MAX_TOOL_ITERATIONS: usize = 20;
const DEFAULT_MAX_NODE_EXECUTIONS: usize = 100;
const DEFAULT_KEEP_RECENT_MESSAGES: usize = 10;

/// Runtime limits shared by every swarm and workflow built from it.
///
/// A timeout of `0` disables that deadline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Outer deadline around an entire swarm or workflow invocation.
    pub run_timeout_secs: u64,
    /// Deadline around a single agent turn, tool executions included.
    pub turn_timeout_secs: u64,
    /// Transport calls allowed per turn before the tool loop gives up.
    pub max_tool_iterations: usize,
    pub retry: RetryPolicy,
    /// Context usage percentages that emit a one-shot warning.
    pub context_warning_thresholds: Vec<u8>,
    /// Context usage percentage that triggers history compaction.
    pub compaction_threshold: u8,
    /// Non-system messages kept verbatim when compaction runs.
    pub keep_recent_messages: usize,
    /// Upper bound on node executions in one workflow run (goto loops included).
    pub max_node_executions: usize,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            run_timeout_secs: DEFAULT_RUN_TIMEOUT_SECS,
            turn_timeout_secs: DEFAULT_TURN_TIMEOUT_SECS,
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            retry: RetryPolicy::default(),
            context_warning_thresholds: vec![60, 80, 90],
            compaction_threshold: 95,
            keep_recent_messages: DEFAULT_KEEP_RECENT_MESSAGES,
            max_node_executions: DEFAULT_MAX_NODE_EXECUTIONS,
        }
    }
}

impl OrchestrationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document; missing keys fall back to defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, SwarmError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SwarmError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults plus environment overrides (`.env` is loaded if present).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Override limits from `SWARMFLOW_*` variables; unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(secs) = env_u64(ENV_RUN_TIMEOUT_SECS) {
            self.run_timeout_secs = secs;
        }
        if let Some(secs) = env_u64(ENV_TURN_TIMEOUT_SECS) {
            self.turn_timeout_secs = secs;
        }
        if let Some(n) = env_u64(ENV_MAX_TOOL_ITERATIONS).filter(|n| *n > 0) {
            self.max_tool_iterations = n as usize;
        }
        if let Some(n) = env_u64(ENV_MAX_RETRY_ATTEMPTS).filter(|n| *n > 0) {
            self.retry.max_attempts = n as u32;
        }
        if let Some(n) = env_u64(ENV_MAX_NODE_EXECUTIONS).filter(|n| *n > 0) {
            self.max_node_executions = n as usize;
        }
    }

    pub fn validate(&self) -> Result<(), SwarmError> {
        if self.max_tool_iterations == 0 {
            return Err(SwarmError::config("max_tool_iterations must be positive"));
        }
        if self.max_node_executions == 0 {
            return Err(SwarmError::config("max_node_executions must be positive"));
        }
        if let Some(bad) = self
            .context_warning_thresholds
            .iter()
            .chain(std::iter::once(&self.compaction_threshold))
            .find(|pct| **pct == 0 || **pct > 100)
        {
            return Err(SwarmError::config(format!(
                "context thresholds must be within 1..=100, got {bad}"
            )));
        }
        Ok(())
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.run_timeout_secs)
    }

    pub fn turn_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.turn_timeout_secs)
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.trim().parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = OrchestrationConfig::from_toml_str(
            r#"
            turn_timeout_secs = 30
            context_warning_thresholds = [50, 75]

            [retry]
            max_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.turn_timeout_secs, 30);
        assert_eq!(config.context_warning_thresholds, vec![50, 75]);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_backoff_ms, 500);
        assert_eq!(config.max_tool_iterations, 20);
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let config = OrchestrationConfig {
            run_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.run_timeout().is_none());
        assert_eq!(config.turn_timeout(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let err = OrchestrationConfig::from_toml_str("compaction_threshold = 120").unwrap_err();
        assert!(matches!(err, SwarmError::Configuration(_)));
    }
}
