//! Error types for AIlex
//!
//! Library code returns [`AilexError`] through the crate-wide [`Result`] alias.
//! Failures of the completion API are classified with [`ProviderError`] so the
//! chat and posting paths can tell a transport failure apart from a response
//! that arrived but was unusable.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Structured classification of text-generation failures.
#[derive(Debug)]
pub enum ProviderError {
    /// 401: Invalid API key or authentication failure
    Auth(String),
    /// 429: Rate limit or quota exceeded
    RateLimit(String),
    /// 402: Payment required or billing issue
    Billing(String),
    /// 500/502/503/504: Server-side errors
    ServerError(String),
    /// 400: Bad request, invalid JSON, malformed parameters
    InvalidRequest(String),
    /// 404: Model not found or endpoint not available
    ModelNotFound(String),
    /// Connection or read timeout
    Timeout(String),
    /// Connection refused, DNS failure, TLS failure, body read failure
    Transport(String),
    /// Success status but the body has no usable completion
    Malformed(String),
    /// Catch-all for unrecognized errors
    Unknown(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            ProviderError::RateLimit(msg) => write!(f, "Rate limit error: {}", msg),
            ProviderError::Billing(msg) => write!(f, "Billing error: {}", msg),
            ProviderError::ServerError(msg) => write!(f, "Server error: {}", msg),
            ProviderError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ProviderError::ModelNotFound(msg) => write!(f, "Model not found: {}", msg),
            ProviderError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            ProviderError::Transport(msg) => write!(f, "Transport error: {}", msg),
            ProviderError::Malformed(msg) => write!(f, "Malformed response: {}", msg),
            ProviderError::Unknown(msg) => write!(f, "Unknown provider error: {}", msg),
        }
    }
}

impl ProviderError {
    /// Returns `true` when the request never produced an HTTP response.
    pub fn is_transport(&self) -> bool {
        matches!(self, ProviderError::Timeout(_) | ProviderError::Transport(_))
    }

    /// Returns `true` when the API answered with success but no usable text.
    pub fn is_malformed(&self) -> bool {
        matches!(self, ProviderError::Malformed(_))
    }

    /// Returns the HTTP status code associated with this error, if applicable.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Auth(_) => Some(401),
            ProviderError::RateLimit(_) => Some(429),
            ProviderError::Billing(_) => Some(402),
            ProviderError::ServerError(_) => Some(500),
            ProviderError::InvalidRequest(_) => Some(400),
            ProviderError::ModelNotFound(_) => Some(404),
            ProviderError::Timeout(_)
            | ProviderError::Transport(_)
            | ProviderError::Malformed(_)
            | ProviderError::Unknown(_) => None,
        }
    }

    /// Classify a `reqwest` failure that happened before a status was received.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

impl From<ProviderError> for AilexError {
    fn from(err: ProviderError) -> Self {
        AilexError::Provider(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for AIlex operations.
#[derive(Error, Debug)]
pub enum AilexError {
    /// Configuration-related errors (invalid config, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Classified text-generation failure.
    #[error("Provider error: {0}")]
    Provider(ProviderError),

    /// Channel errors (connection failures, invalid chat id, send failures)
    #[error("Channel error: {0}")]
    Channel(String),

    /// Tool-building service errors (transport or unreadable response)
    #[error("Tool service error: {0}")]
    ToolService(String),

    /// Feed fetch errors
    #[error("Feed error: {0}")]
    Feed(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Message bus channel closed unexpectedly
    #[error("Bus error: channel closed")]
    BusClosed,
}

/// A specialized `Result` type for AIlex operations.
pub type Result<T> = std::result::Result<T, AilexError>;
