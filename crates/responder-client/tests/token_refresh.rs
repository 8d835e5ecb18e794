//! End-to-end token refresh behaviour against a mock API and token endpoint.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use responder_auth::{
    AuthStore, CredentialStore, Credentials, HttpTokenEndpoint, MemoryTokenPersistence,
    OAuthConfig, SignInStatus,
};
use responder_client::{Error, ResponderClient};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROTECTED: &str = "/api/v4/test-endpoint";
const TOKEN: &str = "/connect/token";

struct Harness {
    server: MockServer,
    store: Arc<AuthStore>,
    client: ResponderClient,
}

impl Harness {
    /// Signed-in session whose tokens were obtained `access_age` and
    /// `refresh_age` ago.
    async fn signed_in(access_age: ChronoDuration, refresh_age: ChronoDuration) -> Self {
        let server = MockServer::start().await;
        let endpoint = Arc::new(HttpTokenEndpoint::new(OAuthConfig::new(
            format!("{}{}", server.uri(), TOKEN),
            "responder-mobile",
            "openid offline_access",
        )));

        let now = Utc::now();
        let mut credentials = Credentials::signed_in("access-token", "valid-refresh-token", now);
        credentials.access_token_obtained_at = Some(now - access_age);
        credentials.refresh_token_obtained_at = Some(now - refresh_age);
        credentials.user_id = Some("test-user".to_string());

        let store = Arc::new(
            AuthStore::new(endpoint.clone(), Arc::new(MemoryTokenPersistence::new()))
                .with_credentials(credentials),
        );

        let client = ResponderClient::builder()
            .base_url(server.uri())
            .credentials(store.clone())
            .token_endpoint(endpoint)
            .build()
            .unwrap();

        Self {
            server,
            store,
            client,
        }
    }

    async fn fresh() -> Self {
        Self::signed_in(ChronoDuration::minutes(1), ChronoDuration::days(1)).await
    }

    async fn mock_refresh(&self, response: ResponseTemplate, expected: u64) {
        Mock::given(method("POST"))
            .and(path(TOKEN))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(response)
            .expect(expected)
            .mount(&self.server)
            .await;
    }

    async fn mock_protected(&self, bearer: &str, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(PROTECTED))
            .and(header("Authorization", format!("Bearer {}", bearer).as_str()))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    async fn protected_hits(&self) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == PROTECTED)
            .count()
    }

    async fn call(&self) -> responder_client::Result<responder_client::ApiResponse<Value>> {
        self.client.endpoint("test-endpoint").get::<Value>().await
    }
}

/// Formatted log output of the current test.
#[derive(Clone, Default)]
struct LogCapture(Arc<parking_lot::Mutex<Vec<u8>>>);

impl LogCapture {
    /// Route this thread's events into a fresh buffer until the guard drops.
    fn start() -> (Self, tracing::subscriber::DefaultGuard) {
        let capture = Self::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        (capture, tracing::subscriber::set_default(subscriber))
    }

    fn has(&self, level: &str, message: &str) -> bool {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .any(|line| line.contains(level) && line.contains(message))
    }

    fn mentions(&self, message: &str) -> bool {
        String::from_utf8_lossy(&self.0.lock()).contains(message)
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn new_tokens() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": "new-access-token",
        "refresh_token": "new-refresh-token",
        "expires_in": 3600,
        "token_type": "Bearer"
    }))
}

fn success() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "success": true }))
}

fn unauthorized() -> ResponseTemplate {
    ResponseTemplate::new(401).set_body_json(json!({ "message": "Unauthorized" }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Proactive refresh
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_expiring_token_is_refreshed_before_the_call() {
    let h = Harness::signed_in(ChronoDuration::minutes(56), ChronoDuration::days(30)).await;
    h.mock_refresh(new_tokens(), 1).await;
    h.mock_protected("new-access-token", success()).await;

    let response = h.call().await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.data, json!({ "success": true }));
    let state = h.store.snapshot();
    assert_eq!(state.access_token.as_deref(), Some("new-access-token"));
    assert_eq!(state.refresh_token.as_deref(), Some("new-refresh-token"));
    assert_eq!(h.protected_hits().await, 1);
}

#[tokio::test]
async fn test_fresh_token_is_sent_unchanged() {
    let h = Harness::signed_in(ChronoDuration::minutes(30), ChronoDuration::days(30)).await;
    h.mock_refresh(new_tokens(), 0).await;
    h.mock_protected("access-token", success()).await;

    let response = h.call().await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(h.store.snapshot().access_token.as_deref(), Some("access-token"));
}

#[tokio::test]
async fn test_failed_proactive_refresh_sends_previous_token() {
    let (logs, _guard) = LogCapture::start();
    let h = Harness::signed_in(ChronoDuration::minutes(56), ChronoDuration::days(30)).await;
    h.mock_refresh(
        ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })),
        1,
    )
    .await;
    h.mock_protected("access-token", success()).await;

    let response = h.call().await.unwrap();

    assert_eq!(response.data, json!({ "success": true }));
    let state = h.store.snapshot();
    assert_eq!(state.status, SignInStatus::SignedIn);
    assert_eq!(state.access_token.as_deref(), Some("access-token"));
    assert!(logs.has("ERROR", "Failed to refresh token in request interceptor"));
    assert!(!logs.mentions("forcing logout"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Reactive refresh
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_401_is_refreshed_and_replayed_once() {
    let h = Harness::fresh().await;
    h.mock_refresh(new_tokens(), 1).await;
    h.mock_protected("access-token", unauthorized()).await;
    h.mock_protected("new-access-token", success()).await;

    let response = h.call().await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.data, json!({ "success": true }));
    assert_eq!(h.protected_hits().await, 2);

    let state = h.store.snapshot();
    assert_eq!(state.access_token.as_deref(), Some("new-access-token"));
    assert_eq!(state.refresh_token.as_deref(), Some("new-refresh-token"));
    assert_eq!(state.status, SignInStatus::SignedIn);
}

#[tokio::test]
async fn test_second_401_is_not_retried() {
    let h = Harness::fresh().await;
    h.mock_refresh(new_tokens(), 1).await;
    h.mock_protected("access-token", unauthorized()).await;
    h.mock_protected("new-access-token", unauthorized()).await;

    let err = h.call().await.unwrap_err();

    assert!(matches!(err, Error::Auth(_)));
    assert_eq!(h.protected_hits().await, 2);
}

#[tokio::test]
async fn test_transient_refresh_failure_keeps_session() {
    let (logs, _guard) = LogCapture::start();
    let h = Harness::fresh().await;
    h.mock_refresh(ResponseTemplate::new(503), 1).await;
    h.mock_protected("access-token", unauthorized()).await;

    let err = h.call().await.unwrap_err();

    assert!(matches!(err, Error::Refresh(_)));
    assert_eq!(err.status(), Some(503));
    let state = h.store.snapshot();
    assert_eq!(state.status, SignInStatus::SignedIn);
    assert_eq!(state.access_token.as_deref(), Some("access-token"));
    assert_eq!(h.protected_hits().await, 1);
    assert!(logs.has("WARN", "Transient token refresh error, not logging out"));
    assert!(!logs.mentions("forcing logout"));
    assert!(!logs.mentions("User forced to logout"));
}

#[tokio::test]
async fn test_permanent_refresh_failure_logs_out() {
    let (logs, _guard) = LogCapture::start();
    let h = Harness::fresh().await;
    h.mock_refresh(
        ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })),
        1,
    )
    .await;
    h.mock_protected("access-token", unauthorized()).await;

    let err = h.call().await.unwrap_err();

    assert_eq!(err.status(), Some(400));
    let state = h.store.snapshot();
    assert_eq!(state.status, SignInStatus::SignedOut);
    assert!(state.access_token.is_none());
    assert!(state.refresh_token.is_none());
    assert!(logs.has("ERROR", "Permanent token refresh failure, forcing logout"));
    assert!(!logs.has("WARN", "Transient token refresh error"));
}

#[tokio::test]
async fn test_expired_refresh_token_logs_out_without_calling_endpoint() {
    let (logs, _guard) = LogCapture::start();
    let h = Harness::signed_in(ChronoDuration::minutes(1), ChronoDuration::days(366)).await;
    h.mock_refresh(new_tokens(), 0).await;
    Mock::given(method("GET"))
        .and(path(PROTECTED))
        .respond_with(unauthorized())
        .mount(&h.server)
        .await;

    let err = h.call().await.unwrap_err();

    assert!(matches!(err, Error::Auth(_)));
    assert_eq!(h.store.snapshot().status, SignInStatus::SignedOut);
    assert_eq!(h.protected_hits().await, 1);
    assert!(logs.has("ERROR", "Refresh token expired, forcing logout"));
}

#[tokio::test]
async fn test_non_401_errors_pass_through() {
    let h = Harness::fresh().await;
    h.mock_refresh(new_tokens(), 0).await;
    h.mock_protected(
        "access-token",
        ResponseTemplate::new(404).set_body_json(json!({ "message": "No such call" })),
    )
    .await;

    let err = h.call().await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "Not found: No such call");
    assert_eq!(h.store.snapshot().status, SignInStatus::SignedIn);
}

// ─────────────────────────────────────────────────────────────────────────────
// Concurrency
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let h = Harness::fresh().await;
    h.mock_refresh(new_tokens().set_delay(Duration::from_millis(200)), 1)
        .await;
    h.mock_protected("access-token", unauthorized()).await;
    h.mock_protected("new-access-token", success()).await;

    let results = futures::future::join_all((0..5).map(|_| h.call())).await;

    for result in results {
        let response = result.unwrap();
        assert_eq!(response.data, json!({ "success": true }));
    }
    assert_eq!(h.protected_hits().await, 10);
    assert!(!h.client.is_refreshing());
}

#[tokio::test]
async fn test_queued_requests_share_refresh_failure() {
    let h = Harness::fresh().await;
    h.mock_refresh(
        ResponseTemplate::new(503).set_delay(Duration::from_millis(200)),
        1,
    )
    .await;
    h.mock_protected("access-token", unauthorized()).await;

    let results = futures::future::join_all((0..4).map(|_| h.call())).await;

    for result in results {
        let err = result.unwrap_err();
        assert!(matches!(err, Error::Refresh(_)));
        assert_eq!(err.status(), Some(503));
    }
    // Nobody was replayed.
    assert_eq!(h.protected_hits().await, 4);
    assert_eq!(h.store.snapshot().status, SignInStatus::SignedIn);
}

#[tokio::test]
async fn test_separate_clients_do_not_share_refresh_state() {
    let a = Harness::fresh().await;
    let b = Harness::fresh().await;
    a.mock_refresh(new_tokens().set_delay(Duration::from_millis(200)), 1)
        .await;
    b.mock_refresh(new_tokens(), 1).await;
    for h in [&a, &b] {
        h.mock_protected("access-token", unauthorized()).await;
        h.mock_protected("new-access-token", success()).await;
    }

    let (ra, rb) = tokio::join!(a.call(), b.call());

    assert!(ra.is_ok());
    assert!(rb.is_ok());
}

// ─────────────────────────────────────────────────────────────────────────────
// Facade
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_post_sends_body_and_reads_empty_response() {
    let h = Harness::fresh().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/Messages/SendMessage"))
        .and(header("Authorization", "Bearer access-token"))
        .and(body_string_contains("\"subject\":\"Staging\""))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&h.server)
        .await;

    let response = h
        .client
        .endpoint("Messages/SendMessage")
        .post::<(), _>(&json!({ "subject": "Staging" }))
        .await
        .unwrap();

    assert_eq!(response.status, 204);
}

#[tokio::test]
async fn test_get_with_query() {
    let h = Harness::fresh().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/Calls/GetCalls"))
        .and(wiremock::matchers::query_param("state", "active"))
        .respond_with(success())
        .expect(1)
        .mount(&h.server)
        .await;

    let response = h
        .client
        .endpoint("Calls/GetCalls")
        .get_with_query::<Value, _>(&json!({ "state": "active" }))
        .await
        .unwrap();

    assert_eq!(response.data["success"], true);
}

#[tokio::test]
async fn test_cancelled_request() {
    let h = Harness::fresh().await;
    h.mock_protected(
        "access-token",
        success().set_delay(Duration::from_secs(5)),
    )
    .await;

    let cancel = CancellationToken::new();
    let endpoint = h.client.endpoint("test-endpoint").with_cancel(cancel.clone());
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let err = endpoint.get::<Value>().await.unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    canceller.await.unwrap();
}
