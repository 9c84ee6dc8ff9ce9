//! Error types for Quiesce
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur while waiting for a queue to go idle
#[derive(Debug, Error)]
pub enum QuiesceError {
    /// The master idle timeout elapsed with conditions still outstanding
    #[error("App not idle: {message} Unmet conditions: [{}]", .unmet.join(", "))]
    AppNotIdle { unmet: Vec<String>, message: String },

    /// Registered idling resources stayed busy past the dynamic error timeout
    #[error("Idling resources timed out: {message} Busy resources: [{}]", .resources.join(", "))]
    IdlingResourceTimeout { resources: Vec<String>, message: String },

    /// The interrogation loop was interrupted mid-wait
    #[error("Interrupted: {0}")]
    Interrupted(String),

    /// A wait was requested off the thread that owns the queue
    #[error("Expecting to be on the main execution context")]
    NotOnMainContext,

    /// A wait was requested while another interrogation is active on the queue
    #[error("Already interrogating the queue")]
    AlreadyInterrogating,

    /// A wait-at-least call was issued while a previous delay is still pending
    #[error("Recursion detected: a delay wait is already pending")]
    RecursionDetected,

    /// Caller passed an unusable argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid state transition or operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl QuiesceError {
    /// Usage errors are programming mistakes: they fail fast and are never retried
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            QuiesceError::NotOnMainContext
                | QuiesceError::AlreadyInterrogating
                | QuiesceError::RecursionDetected
                | QuiesceError::InvalidArgument(_)
        )
    }

    /// True for the errors raised by idling policies on timeout
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            QuiesceError::AppNotIdle { .. } | QuiesceError::IdlingResourceTimeout { .. }
        )
    }
}

/// Result type alias for Quiesce operations
pub type Result<T> = std::result::Result<T, QuiesceError>;
