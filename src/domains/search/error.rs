//! Search-specific error types.

use thiserror::Error;

/// Errors that can occur while talking to the grounded-search backend.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The upstream API answered with a non-success status.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The prompt or the generated answer was blocked by safety filters.
    #[error("Content blocked: {0}")]
    ContentBlocked(String),

    /// The request never produced a response (connect, TLS, timeout...).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The upstream response could not be understood.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The search result could not be serialized for the client.
    #[error("Failed to serialize search result: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SearchError {
    /// Create a new upstream API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a new "content blocked" error.
    pub fn content_blocked(reason: impl Into<String>) -> Self {
        Self::ContentBlocked(reason.into())
    }

    /// Create a new "malformed response" error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    /// Short label used when logging the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Api { .. } => "api_error",
            Self::ContentBlocked(_) => "content_blocked",
            Self::Network(_) => "network_error",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Serialization(_) => "serialization_error",
        }
    }
}
