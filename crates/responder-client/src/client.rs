//! Main client implementation.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use responder_auth::{SharedCredentialStore, TokenEndpoint};
use serde::de::DeserializeOwned;
use url::Url;

use crate::api::Endpoint;
use crate::error::{Error, ErrorResponse, Result};
use crate::refresh::RefreshGate;
use crate::request::{ApiRequest, ApiResponse, RetryContext, bearer_header};

/// Default timeout for requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default API version segment.
const DEFAULT_API_VERSION: &str = "v4";

/// Responder API client.
///
/// Cheap to clone; clones share the HTTP connection pool, the credential
/// store and the refresh gate. Separate instances never share a gate.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use responder_auth::{AuthStore, HttpTokenEndpoint, MemoryTokenPersistence, OAuthConfig};
/// use responder_client::ResponderClient;
///
/// # async fn example() -> responder_client::Result<()> {
/// let endpoint = Arc::new(HttpTokenEndpoint::new(OAuthConfig::new(
///     "http://localhost:5000/api/v4/connect/token",
///     "responder-mobile",
///     "openid offline_access",
/// )));
/// let store = Arc::new(AuthStore::new(endpoint.clone(), Arc::new(MemoryTokenPersistence::new())));
///
/// let client = ResponderClient::builder()
///     .base_url("http://localhost:5000")
///     .credentials(store)
///     .token_endpoint(endpoint)
///     .build()?;
///
/// let shifts = client.endpoint("Shifts/GetShifts").get::<serde_json::Value>().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ResponderClient {
    /// Inner shared state.
    inner: Arc<ClientInner>,
}

/// Inner client state (shared across clones).
pub(crate) struct ClientInner {
    /// HTTP client.
    pub(crate) http: reqwest::Client,
    /// Base URL for API requests.
    pub(crate) base_url: Url,
    /// Version segment placed after `api/`.
    pub(crate) api_version: String,
    /// Request timeout.
    pub(crate) timeout: Duration,
    /// Owner of the user's tokens.
    pub(crate) credentials: SharedCredentialStore,
    /// Token endpoint used for reactive refreshes.
    pub(crate) token_endpoint: Arc<dyn TokenEndpoint>,
    /// In-flight refresh flag and wait queue.
    pub(crate) gate: RefreshGate,
    /// Authorization applied to requests that carry none of their own.
    pub(crate) default_authorization: RwLock<Option<HeaderValue>>,
}

impl std::fmt::Debug for ResponderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponderClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("api_version", &self.inner.api_version)
            .field("refreshing", &self.inner.gate.is_refreshing())
            .finish()
    }
}

impl ResponderClient {
    /// Get access to the inner client state (for the interceptors).
    pub(crate) fn inner(&self) -> &ClientInner {
        &self.inner
    }

    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// The credential store this client authenticates with.
    pub fn credentials(&self) -> &SharedCredentialStore {
        &self.inner.credentials
    }

    /// Whether a reactive refresh is currently running.
    pub fn is_refreshing(&self) -> bool {
        self.inner.gate.is_refreshing()
    }

    /// Access an API endpoint by path, e.g. `Calls/GetActiveCalls`.
    pub fn endpoint(&self, path: impl Into<String>) -> Endpoint {
        Endpoint::new(self.clone(), path)
    }

    /// Send a request and return the raw JSON response.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse<serde_json::Value>> {
        self.send_json(request).await
    }

    /// Send a request and deserialize the response body.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<ApiResponse<T>> {
        match request.cancel.clone() {
            Some(cancel) => tokio::select! {
                _ = cancel.cancelled() => Err(Error::Cancelled),
                result = self.execute(request) => result,
            },
            None => self.execute(request).await,
        }
    }

    /// Run a request through both interceptors.
    async fn execute<T: DeserializeOwned>(&self, mut request: ApiRequest) -> Result<ApiResponse<T>> {
        self.authorize(&mut request).await?;

        let ctx = RetryContext::new(request);
        match self.dispatch(&ctx.request).await {
            Ok(response) => Ok(response),
            Err(err) => self.recover(ctx, err).await,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal HTTP methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Build a URL for an API path.
    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        let path = path.trim_start_matches('/');
        self.inner
            .base_url
            .join(&format!("api/{}/{}", self.inner.api_version, path))
            .map_err(Error::from)
    }

    /// Replace the authorization used by requests without their own.
    pub(crate) fn set_default_authorization(&self, value: Option<HeaderValue>) {
        *self.inner.default_authorization.write() = value;
    }

    /// Send a request once, without any refresh handling.
    pub(crate) async fn dispatch<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<ApiResponse<T>> {
        let url = self.url(&request.path)?;

        let mut headers = request.headers.clone();
        if !headers.contains_key(AUTHORIZATION) {
            let default = self.inner.default_authorization.read().clone();
            if let Some(value) = default {
                headers.insert(AUTHORIZATION, value);
            }
        }

        let mut builder = self
            .inner
            .http
            .request(request.method.clone(), url)
            .headers(headers)
            .timeout(self.inner.timeout);
        if let Some(query) = &request.query {
            builder = builder.query(query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        self.handle_response(response).await
    }

    /// Handle a response, extracting the body or error.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<ApiResponse<T>> {
        let status = response.status();
        if !status.is_success() {
            return Err(self.extract_error(response).await);
        }

        let bytes = response.bytes().await?;
        let data = if bytes.iter().all(u8::is_ascii_whitespace) {
            // 204 and other empty bodies
            serde_json::from_value(serde_json::Value::Null)?
        } else {
            serde_json::from_slice(&bytes)?
        };

        Ok(ApiResponse {
            status: status.as_u16(),
            data,
        })
    }

    /// Extract an error from a failed response.
    async fn extract_error(&self, response: reqwest::Response) -> Error {
        let status = response.status().as_u16();

        let parsed = response.json::<ErrorResponse>().await.ok();
        let message = parsed
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| format!("HTTP {}", status));

        match status {
            401 => Error::Auth(message),
            404 => Error::NotFound(message),
            _ => Error::Api {
                status,
                code: parsed
                    .and_then(|e| e.code)
                    .unwrap_or_else(|| "unknown".to_string()),
                message,
            },
        }
    }
}

/// Builder for creating a ResponderClient.
pub struct ClientBuilder {
    base_url: Option<String>,
    api_version: String,
    auth_token: Option<String>,
    timeout: Duration,
    user_agent: Option<String>,
    credentials: Option<SharedCredentialStore>,
    token_endpoint: Option<Arc<dyn TokenEndpoint>>,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

impl ClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            base_url: None,
            api_version: DEFAULT_API_VERSION.to_string(),
            auth_token: None,
            timeout: DEFAULT_TIMEOUT,
            user_agent: None,
            credentials: None,
            token_endpoint: None,
        }
    }

    /// Set the base URL for the server.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the API version segment (default `v4`).
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Set an initial default bearer token.
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Set the credential store.
    pub fn credentials(mut self, store: SharedCredentialStore) -> Self {
        self.credentials = Some(store);
        self
    }

    /// Set the token endpoint used for reactive refreshes.
    pub fn token_endpoint(mut self, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        self.token_endpoint = Some(endpoint);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<ResponderClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Config("base_url is required".to_string()))?;
        let credentials = self
            .credentials
            .ok_or_else(|| Error::Config("credentials are required".to_string()))?;
        let token_endpoint = self
            .token_endpoint
            .ok_or_else(|| Error::Config("token_endpoint is required".to_string()))?;

        let api_version = self.api_version.trim_matches('/').to_string();
        if api_version.is_empty() {
            return Err(Error::Config("api_version must not be empty".to_string()));
        }

        // Parse and normalize base URL
        let mut base_url = Url::parse(&base_url)?;
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let default_authorization = self.auth_token.as_deref().map(bearer_header).transpose()?;

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("responder-client/{}", env!("CARGO_PKG_VERSION")));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .build()?;

        Ok(ResponderClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                api_version,
                timeout: self.timeout,
                credentials,
                token_endpoint,
                gate: RefreshGate::new(),
                default_authorization: RwLock::new(default_authorization),
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
