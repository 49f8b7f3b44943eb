//! Error types for the toolrelay domain.
//!
//! Each bounded context has its own `thiserror` enum; [`Error`] wraps them
//! for callers that only need to bubble a failure up.

use thiserror::Error;

/// The top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Agent store error: {0}")]
    AgentStore(#[from] AgentStoreError),

    #[error("Signing error: {0}")]
    Signing(#[from] SigningError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures talking to a model backend.
///
/// Adapters never retry; every non-2xx response is surfaced as
/// [`ProviderError::ApiError`] with the raw body intact.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Malformed provider response: {0}")]
    Decode(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// HTTP status carried by the error, if the backend answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ApiError { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

/// Raised by the request signer. Always fatal for the request.
#[derive(Debug, Clone, Error)]
pub enum SigningError {
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("invalid request url: {0}")]
    InvalidUrl(String),

    #[error("invalid signing key length")]
    InvalidKey,
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// Failures reported by an [`crate::AgentStore`].
#[derive(Debug, Clone, Error)]
pub enum AgentStoreError {
    #[error("agent not found: {0}")]
    NotFound(String),

    #[error("permission denied for agent {0}")]
    PermissionDenied(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("database error: {0}")]
    Database(String),
}

impl AgentStoreError {
    /// Network and database failures are transient; the rest are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Database(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_status_and_body() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 529,
            message: r#"{"type":"overloaded_error"}"#.into(),
        });
        assert!(err.to_string().contains("529"));
        assert!(err.to_string().contains("overloaded_error"));
    }

    #[test]
    fn signing_error_converts_into_provider_error() {
        let err: ProviderError = SigningError::MissingCredential("secret_access_key").into();
        assert!(err.to_string().contains("secret_access_key"));
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn store_error_retryability() {
        assert!(AgentStoreError::Network("reset".into()).is_retryable());
        assert!(AgentStoreError::Database("timeout".into()).is_retryable());
        assert!(!AgentStoreError::NotFound("a".into()).is_retryable());
        assert!(!AgentStoreError::PermissionDenied("a".into()).is_retryable());
    }
}
