//! Error types for swarmflow.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion, TimeoutScope};

use thiserror::Error;

/// Primary error type for all orchestration operations.
#[derive(Error, Debug)]
pub enum SwarmError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Workflow dependency cycle: {}", cycle.join(" -> "))]
    GraphCycle { cycle: Vec<String> },

    #[error("Circular delegation detected: {}", chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },

    #[error("Unknown delegation target '{target}' (requested by '{caller}')")]
    UnknownTarget { target: String, caller: String },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Network error: {0}")]
    Network(String),

    #[error("{scope} timeout after {after_ms}ms")]
    Timeout { scope: TimeoutScope, after_ms: u64 },

    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Stale read: '{resource}' for agent '{agent}': {reason}")]
    StaleRead {
        agent: String,
        resource: String,
        reason: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl SwarmError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Network(_) => ErrorCategory::Network,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Configuration(_) | Self::GraphCycle { .. } | Self::ConfigParse(_) => {
                ErrorCategory::Configuration
            }
            Self::Serialization(_) | Self::Snapshot(_) => ErrorCategory::Serialization,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                408 => ErrorCategory::Timeout,
                429 => ErrorCategory::RateLimit,
                400..=499 => ErrorCategory::Validation,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::ToolExecution { .. } | Self::ToolNotFound(_) => ErrorCategory::ToolExecution,
            Self::CircularDependency { .. } | Self::UnknownTarget { .. } => {
                ErrorCategory::Delegation
            }
            Self::RetriesExhausted { .. } => ErrorCategory::Exhausted,
            Self::StaleRead { .. } => ErrorCategory::StaleRead,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Whether the transport retry loop should try again.
    ///
    /// Timeouts are excluded: a turn timeout is enforced around the retry
    /// loop, never inside it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit | ErrorCategory::Network | ErrorCategory::Server
        ) || matches!(self, Self::Api { status: 408, .. })
    }

    /// Whether this error ends the whole run instead of being captured into
    /// a node or delegation result.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Authentication | ErrorCategory::Validation
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Authentication => RecoverySuggestion::CheckCredentials,
            ErrorCategory::RateLimit => RecoverySuggestion::RetryWithBackoff,
            ErrorCategory::Network => RecoverySuggestion::RetryWithBackoff,
            ErrorCategory::Server => RecoverySuggestion::RetryWithBackoff,
            ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::ToolExecution => RecoverySuggestion::CheckToolImplementation,
            ErrorCategory::StaleRead => RecoverySuggestion::RereadResource,
            ErrorCategory::Delegation => RecoverySuggestion::CheckDelegationGraph,
            _ => RecoverySuggestion::ContactSupport,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SwarmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circular_dependency_message_names_the_chain() {
        let err = SwarmError::CircularDependency {
            chain: vec!["lead".into(), "backend".into(), "lead".into()],
        };
        assert_eq!(
            err.to_string(),
            "Circular delegation detected: lead -> backend -> lead"
        );
    }

    #[test]
    fn transport_errors_split_into_retryable_and_terminal() {
        let retryable = [
            SwarmError::RateLimited {
                retry_after_ms: Some(100),
            },
            SwarmError::Network("connection reset".into()),
            SwarmError::api(503, "unavailable"),
        ];
        for err in retryable {
            assert!(err.is_retryable(), "{err} should be retryable");
            assert!(!err.is_terminal(), "{err} should not be terminal");
        }

        let terminal = [
            SwarmError::Authentication("bad key".into()),
            SwarmError::api(401, "unauthorized"),
            SwarmError::api(403, "forbidden"),
            SwarmError::api(400, "invalid request"),
        ];
        for err in terminal {
            assert!(!err.is_retryable(), "{err} should not be retryable");
            assert!(err.is_terminal(), "{err} should be terminal");
        }
    }

    #[test]
    fn timeouts_are_distinguishable_by_scope() {
        let run = SwarmError::Timeout {
            scope: TimeoutScope::Run,
            after_ms: 1000,
        };
        let turn = SwarmError::Timeout {
            scope: TimeoutScope::Turn,
            after_ms: 50,
        };
        assert_eq!(run.to_string(), "run timeout after 1000ms");
        assert_eq!(turn.to_string(), "turn timeout after 50ms");
        assert!(!run.is_retryable());
        assert_eq!(turn.recovery_suggestion(), RecoverySuggestion::IncreaseTimeout);
    }

    #[test]
    fn stale_read_suggests_rereading() {
        let err = SwarmError::StaleRead {
            agent: "dev".into(),
            resource: "src/main.rs".into(),
            reason: "modified since last read".into(),
        };
        assert_eq!(err.category(), ErrorCategory::StaleRead);
        assert_eq!(err.recovery_suggestion(), RecoverySuggestion::RereadResource);
    }
}
