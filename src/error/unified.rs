//! Error classification and recovery hints.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    Validation,
    RateLimit,
    Network,
    Timeout,
    Server,
    Api,
    Exhausted,
    Configuration,
    Serialization,
    ToolExecution,
    Delegation,
    StaleRead,
    Unknown,
}

/// Which timeout fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TimeoutScope {
    /// Wraps an entire swarm or workflow invocation.
    Run,
    /// Wraps a single agent turn, tool executions included.
    Turn,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RetryWithBackoff,
    CheckCredentials,
    CheckConfiguration,
    IncreaseTimeout,
    CheckToolImplementation,
    CheckDelegationGraph,
    RereadResource,
    ContactSupport,
}
