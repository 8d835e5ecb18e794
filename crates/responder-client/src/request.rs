//! Request descriptors passed through the interceptor pipeline.

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// A replayable API request.
///
/// Bodies and queries are held as JSON values so a request can be sent again
/// after a token refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the versioned API root.
    pub path: String,
    pub query: Option<serde_json::Value>,
    pub body: Option<serde_json::Value>,
    pub headers: HeaderMap,
    pub cancel: Option<CancellationToken>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            body: None,
            headers: HeaderMap::new(),
            cancel: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_query<Q: serde::Serialize + ?Sized>(mut self, query: &Q) -> Result<Self> {
        self.query = Some(serde_json::to_value(query)?);
        Ok(self)
    }

    pub fn with_body<B: serde::Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Set `Authorization: Bearer <token>`.
    pub fn set_bearer(&mut self, token: &str) -> Result<()> {
        self.headers.insert(AUTHORIZATION, bearer_header(token)?);
        Ok(())
    }

    /// Current `Authorization` header value, if set and printable.
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
    }
}

/// Build a bearer `Authorization` header value.
pub(crate) fn bearer_header(token: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|_| Error::Config("Invalid access token".to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}

/// A request together with its retry marker.
///
/// `retried` starts false, becomes true on the first retry and never resets,
/// so a request is refreshed-and-replayed at most once.
#[derive(Debug, Clone)]
pub struct RetryContext {
    pub request: ApiRequest,
    retried: bool,
}

impl RetryContext {
    pub fn new(request: ApiRequest) -> Self {
        Self {
            request,
            retried: false,
        }
    }

    pub fn retried(&self) -> bool {
        self.retried
    }

    pub fn mark_retried(&mut self) {
        self.retried = true;
    }
}

/// A successful response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub data: T,
}
