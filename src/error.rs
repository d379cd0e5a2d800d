//! Error types for codeloop operations.
//!
//! Defines the error types shared across subsystems:
//! - LLM API interactions (live and replayed providers)
//! - Loop and policy configuration
//! - Conversation snapshot handling
//!
//! Code-quality problems found while running candidate code are *not* errors;
//! they are [`crate::sandbox::ExecutionFault`] values. The types here describe
//! failures of the host or of an external collaborator.

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: LITELLM_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Replay exhausted after {served} responses")]
    ReplayExhausted { served: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors raised by the conversation store.
#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("Snapshot '{0}' does not exist")]
    UnknownSnapshot(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::InvalidValue {
            key: "CODELOOP_MAX_ATTEMPTS".to_string(),
            message: "could not parse 'x'".to_string(),
        };
        assert!(err.to_string().contains("CODELOOP_MAX_ATTEMPTS"));

        let err = ConversationError::UnknownSnapshot("initial".to_string());
        assert_eq!(err.to_string(), "Snapshot 'initial' does not exist");

        let err = LlmError::ReplayExhausted { served: 3 };
        assert!(err.to_string().contains('3'));
    }
}
