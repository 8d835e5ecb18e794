//! OAuth2 token endpoint: password grant for sign-in, refresh_token grant
//! for renewal.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

/// Where and as whom to request tokens.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub token_url: String,
    pub client_id: String,
    pub scope: String,
}

impl OAuthConfig {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            scope: scope.into(),
        }
    }
}

/// Username and password for the password grant.
#[derive(Clone)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn default_expires_in() -> u64 {
    3600
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Token endpoint response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Only present when the server rotates the refresh token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
}

impl TokenResponse {
    /// The refresh token issued with this response, ignoring empty strings.
    pub fn rotated_refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// OAuth error body (`{"error": "...", "error_description": "..."}`).
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Serialize)]
struct PasswordGrantRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    scope: &'a str,
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshGrantRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    scope: &'a str,
    refresh_token: &'a str,
}

// ============================================================================
// TokenEndpoint Trait
// ============================================================================

/// The network service that mints tokens.
#[async_trait]
pub trait TokenEndpoint: Send + Sync + fmt::Debug {
    /// Exchange a username and password for tokens.
    async fn login(&self, credentials: &LoginCredentials) -> Result<TokenResponse>;

    /// Exchange a refresh token for a new access token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse>;
}

// ============================================================================
// HttpTokenEndpoint
// ============================================================================

/// Form-encoded OAuth2 token endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTokenEndpoint {
    config: OAuthConfig,
    http: reqwest::Client,
}

impl HttpTokenEndpoint {
    pub fn new(config: OAuthConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Use an existing HTTP client (shares its timeout and connection pool).
    pub fn with_client(config: OAuthConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    async fn request_tokens<F: Serialize + ?Sized>(&self, form: &F, what: &str) -> Result<TokenResponse> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::Network(format!("{} request failed: {}", what, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<OAuthErrorBody>(&body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {}", err.error, description),
                    None => err.error,
                },
                Err(_) if body.is_empty() => format!("HTTP {}", status.as_u16()),
                Err(_) => body,
            };
            return Err(AuthError::Http {
                status: status.as_u16(),
                message: format!("{} failed: {}", what, message),
            });
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Serialization(format!("Failed to parse {} response: {}", what, e)))
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn login(&self, credentials: &LoginCredentials) -> Result<TokenResponse> {
        let form = PasswordGrantRequest {
            grant_type: "password",
            client_id: &self.config.client_id,
            scope: &self.config.scope,
            username: &credentials.username,
            password: &credentials.password,
        };
        self.request_tokens(&form, "Login").await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        let form = RefreshGrantRequest {
            grant_type: "refresh_token",
            client_id: &self.config.client_id,
            scope: &self.config.scope,
            refresh_token,
        };
        self.request_tokens(&form, "Token refresh").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint(server: &MockServer) -> HttpTokenEndpoint {
        HttpTokenEndpoint::new(OAuthConfig::new(
            format!("{}/connect/token", server.uri()),
            "responder-mobile",
            "openid offline_access",
        ))
    }

    #[tokio::test]
    async fn test_refresh_sends_refresh_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/connect/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=valid-refresh-token"))
            .and(body_string_contains("client_id=responder-mobile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-access-token",
                "refresh_token": "new-refresh-token",
                "id_token": "x.y.z",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = endpoint(&server).refresh("valid-refresh-token").await.unwrap();
        assert_eq!(tokens.access_token, "new-access-token");
        assert_eq!(tokens.rotated_refresh_token(), Some("new-refresh-token"));
    }

    #[tokio::test]
    async fn test_login_sends_password_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/connect/token"))
            .and(body_string_contains("grant_type=password"))
            .and(body_string_contains("username=jdoe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "a",
                "refresh_token": "r",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let creds = LoginCredentials {
            username: "jdoe".to_string(),
            password: "hunter2".to_string(),
        };
        let tokens = endpoint(&server).login(&creds).await.unwrap();
        assert_eq!(tokens.access_token, "a");
    }

    #[tokio::test]
    async fn test_error_status_is_preserved() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/connect/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "refresh token revoked"
            })))
            .mount(&server)
            .await;

        let err = endpoint(&server).refresh("revoked").await.unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_has_no_status() {
        let endpoint = HttpTokenEndpoint::new(OAuthConfig::new(
            "http://127.0.0.1:9/connect/token",
            "responder-mobile",
            "openid",
        ));
        let err = endpoint.refresh("anything").await.unwrap_err();
        assert!(matches!(err, AuthError::Network(_)));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_empty_refresh_token_is_not_rotation() {
        let tokens: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "a",
            "refresh_token": ""
        }))
        .unwrap();
        assert_eq!(tokens.rotated_refresh_token(), None);
        assert_eq!(tokens.expires_in, 3600);
        assert_eq!(tokens.token_type, "Bearer");
    }

    #[test]
    fn test_login_credentials_debug_redacts_password() {
        let creds = LoginCredentials {
            username: "jdoe".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{:?}", creds);
        assert!(debug.contains("jdoe"));
        assert!(!debug.contains("hunter2"));
    }
}
