//! Authenticated HTTP client for the Responder API.
//!
//! Every request goes through two interceptors:
//!
//! - **before sending**, an access token close to expiry is refreshed
//!   proactively and the bearer token is attached;
//! - **after a 401**, the token is refreshed once and the request replayed.
//!   Concurrent 401s share a single refresh; the others wait in a FIFO queue
//!   and replay (or fail) with its outcome.
//!
//! Refresh failures are classified as transient (network, 429, 502-504),
//! which keep the session, or permanent, which force a logout.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use responder_auth::{AuthStore, HttpTokenEndpoint, MemoryTokenPersistence, OAuthConfig};
//! use responder_client::{ResponderClient, Result};
//!
//! # async fn example() -> Result<()> {
//! let endpoint = Arc::new(HttpTokenEndpoint::new(OAuthConfig::new(
//!     "https://api.example.org/api/v4/connect/token",
//!     "responder-mobile",
//!     "openid offline_access",
//! )));
//! let store = Arc::new(AuthStore::new(endpoint.clone(), Arc::new(MemoryTokenPersistence::new())));
//!
//! let client = ResponderClient::builder()
//!     .base_url("https://api.example.org")
//!     .credentials(store)
//!     .token_endpoint(endpoint)
//!     .build()?;
//!
//! let calls = client
//!     .endpoint("Calls/GetActiveCalls")
//!     .get::<serde_json::Value>()
//!     .await?;
//! println!("{} -> {}", calls.status, calls.data);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod classify;
pub mod client;
pub mod error;
mod interceptor;
pub mod refresh;
pub mod request;

pub use api::Endpoint;
pub use classify::is_transient;
pub use client::{ClientBuilder, ResponderClient};
pub use error::{Error, Result};
pub use refresh::{RefreshGate, RefreshOutcome, WaitQueue};
pub use request::{ApiRequest, ApiResponse, RetryContext};
