//! Error types for LLM provider calls.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("failed to serialize/deserialize: {0}")]
    SerializationError(String),

    #[error("authentication failed: {0}")]
    AuthenticationError(String),

    #[error("API key not found: {0}")]
    ApiKeyNotFound(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("provider error: {0}")]
    ProviderError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("model output did not satisfy the requested schema: {0}")]
    SchemaValidation(String),

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::HttpError(_)
                | LlmError::ServiceUnavailable(_)
                | LlmError::RateLimitExceeded(_)
                | LlmError::Timeout(_)
        )
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self, LlmError::AuthenticationError(_) | LlmError::ApiKeyNotFound(_))
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(e: serde_json::Error) -> Self {
        LlmError::SerializationError(e.to_string())
    }
}

/// Stable kind string, mirroring `skillforge_core::ExecutorErrorKind` where
/// applicable, for callers that need to record `_error.kind` without
/// depending on this crate's concrete error enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmErrorKind {
    Transport,
    Auth,
    RateLimit,
    Timeout,
    InvalidOutput,
    Config,
    Other,
}

impl LlmError {
    pub fn kind(&self) -> LlmErrorKind {
        match self {
            LlmError::HttpError(_) | LlmError::ServiceUnavailable(_) => LlmErrorKind::Transport,
            LlmError::AuthenticationError(_) | LlmError::ApiKeyNotFound(_) => LlmErrorKind::Auth,
            LlmError::RateLimitExceeded(_) => LlmErrorKind::RateLimit,
            LlmError::Timeout(_) => LlmErrorKind::Timeout,
            LlmError::SerializationError(_)
            | LlmError::InvalidResponse(_)
            | LlmError::SchemaValidation(_)
            | LlmError::ModelNotFound(_)
            | LlmError::InvalidRequest(_) => LlmErrorKind::InvalidOutput,
            LlmError::ConfigError(_) => LlmErrorKind::Config,
            LlmError::ProviderError(_) | LlmError::Other(_) => LlmErrorKind::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
