//! Error types for the sdox agent.

use std::time::Duration;

/// Top-level error type for the agent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors. The only fatal class, raised at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Delivery failures from the messaging platform.
///
/// Always transient from the core's point of view: callers log and continue.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to edit message on channel {name}: {reason}")]
    EditFailed { name: String, reason: String },

    #[error("Failed to delete messages on channel {name}: {reason}")]
    DeleteFailed { name: String, reason: String },

    #[error("Rate limited on channel {name}, retry after {retry_after:?}")]
    RateLimited {
        name: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Text-generation collaborator errors. Every call site has a local fallback.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited")]
    RateLimited { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Arithmetic evaluation failures, surfaced to the chat as `Error`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalcError {
    #[error("Empty expression")]
    Empty,

    #[error("Unexpected token {token:?} at position {position}")]
    UnexpectedToken { token: String, position: usize },

    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    #[error("Invalid number literal: {0}")]
    InvalidNumber(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Expression nested too deeply")]
    TooDeep,

    #[error("Result is not a finite number")]
    NotFinite,
}

/// Best-effort snapshot errors. Never fatal.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Snapshot IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_into_top_level() {
        let err: Error = ConfigError::MissingEnvVar("TOKEN".into()).into();
        assert_eq!(
            err.to_string(),
            "Configuration error: Missing required environment variable: TOKEN"
        );
    }

    #[test]
    fn rate_limited_message_includes_channel() {
        let err = ChannelError::RateLimited {
            name: "telegram".into(),
            retry_after: Some(Duration::from_secs(3)),
        };
        assert!(err.to_string().contains("telegram"));
        assert!(err.to_string().contains("3s"));
    }
}
