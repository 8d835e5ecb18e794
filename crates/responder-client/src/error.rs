//! Client error types.

use responder_auth::AuthError;
use thiserror::Error;

/// Client error type.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error code from server.
        code: String,
        /// Error message from server.
        message: String,
    },

    /// Server answered 401.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Refreshing the access token failed.
    #[error("Token refresh failed: {0}")]
    Refresh(#[from] AuthError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller cancelled the request.
    #[error("Request cancelled")]
    Cancelled,
}

impl Error {
    /// HTTP status attached to this failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Auth(_) => Some(401),
            Error::NotFound(_) => Some(404),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            Error::Refresh(e) => e.status(),
            _ => None,
        }
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_)) || matches!(self, Error::Api { status: 404, .. })
    }

    /// Check if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Auth(_)) || matches!(self, Error::Api { status: 401, .. })
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error response from the server.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default, alias = "error", alias = "Message")]
    pub message: Option<String>,
}
