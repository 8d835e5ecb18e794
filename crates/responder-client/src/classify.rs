//! Refresh failure classification.

use responder_auth::AuthError;

/// Statuses from the token endpoint that mean "try again later".
const TRANSIENT_STATUSES: [u16; 4] = [429, 502, 503, 504];

/// Whether a refresh failure is transient.
///
/// Failures without an HTTP status (network, timeout, local errors) and
/// rate-limit or gateway statuses are transient; the session is kept.
/// Any other status is permanent and ends the session.
pub fn is_transient(error: &AuthError) -> bool {
    match error.status() {
        None => true,
        Some(status) => TRANSIENT_STATUSES.contains(&status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> AuthError {
        AuthError::Http {
            status,
            message: format!("HTTP {}", status),
        }
    }

    #[test]
    fn test_gateway_and_rate_limit_are_transient() {
        for status in [429, 502, 503, 504] {
            assert!(is_transient(&http(status)), "{} should be transient", status);
        }
    }

    #[test]
    fn test_other_statuses_are_permanent() {
        for status in [400, 401, 403, 404, 500, 501, 505] {
            assert!(!is_transient(&http(status)), "{} should be permanent", status);
        }
    }

    #[test]
    fn test_errors_without_response_are_transient() {
        assert!(is_transient(&AuthError::Network("connection reset".into())));
        assert!(is_transient(&AuthError::NoRefreshToken));
        assert!(is_transient(&AuthError::Serialization("eof".into())));
    }
}
