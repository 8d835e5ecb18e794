//! ID token payload decoding.
//!
//! Only the claims are read; the signature is the server's concern.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

use crate::credentials::Profile;
use crate::error::{AuthError, Result};

/// Decode the payload segment of a JWT into a [`Profile`].
pub fn decode_profile(id_token: &str) -> Result<Profile> {
    let mut parts = id_token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_)) if !payload.is_empty() => payload,
        _ => {
            return Err(AuthError::InvalidIdToken(
                "Invalid ID token format".to_string(),
            ));
        }
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::InvalidIdToken(format!("payload is not base64url: {}", e)))?;

    // Some issuers pad the payload with NUL bytes.
    let json: String = String::from_utf8_lossy(&bytes)
        .chars()
        .filter(|c| *c != '\0')
        .collect();

    serde_json::from_str(&json)
        .map_err(|e| AuthError::InvalidIdToken(format!("payload is not a claim set: {}", e)))
}
