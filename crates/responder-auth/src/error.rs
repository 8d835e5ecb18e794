//! Error types for credential management.

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur while obtaining, refreshing or storing credentials.
///
/// `Clone` so that a single refresh failure can be handed to every request
/// waiting on that refresh.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// The token endpoint could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// The token endpoint answered with a non-success status.
    #[error("Token endpoint returned {status}: {message}")]
    Http { status: u16, message: String },

    /// No refresh token is held.
    #[error("No refresh token available")]
    NoRefreshToken,

    /// The refresh token is past its lifetime.
    #[error("Refresh token expired")]
    RefreshTokenExpired,

    /// The ID token is missing or malformed.
    #[error("Invalid ID token: {0}")]
    InvalidIdToken(String),

    /// Persisted credentials could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A payload could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration.
    #[error("Config error: {0}")]
    Config(String),
}

impl AuthError {
    /// HTTP status carried by the failure, if the endpoint answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => AuthError::Http {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None => AuthError::Network(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(e: serde_json::Error) -> Self {
        AuthError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_only_for_http() {
        let http = AuthError::Http {
            status: 503,
            message: "Service Unavailable".to_string(),
        };
        assert_eq!(http.status(), Some(503));
        assert_eq!(AuthError::Network("reset".to_string()).status(), None);
        assert_eq!(AuthError::NoRefreshToken.status(), None);
    }
}
