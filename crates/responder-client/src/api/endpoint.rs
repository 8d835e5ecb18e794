//! Per-path endpoint facade.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::client::ResponderClient;
use crate::error::Result;
use crate::request::{ApiRequest, ApiResponse};

/// A single API path, e.g. `Calls/GetActiveCalls`.
///
/// Every call goes through the client's interceptors, so callers never see
/// a 401 that a token refresh could have resolved.
#[derive(Debug, Clone)]
pub struct Endpoint {
    client: ResponderClient,
    path: String,
    cancel: Option<CancellationToken>,
}

impl Endpoint {
    pub(crate) fn new(client: ResponderClient, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
            cancel: None,
        }
    }

    /// Path relative to the versioned API root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Abort calls made through this endpoint when `token` is cancelled.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// GET the endpoint.
    pub async fn get<T: DeserializeOwned>(&self) -> Result<ApiResponse<T>> {
        self.send(self.request(ApiRequest::get(&self.path))).await
    }

    /// GET the endpoint with query parameters.
    pub async fn get_with_query<T, Q>(&self, query: &Q) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let request = self.request(ApiRequest::get(&self.path)).with_query(query)?;
        self.send(request).await
    }

    /// POST a JSON body.
    pub async fn post<T, B>(&self, body: &B) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let request = self.request(ApiRequest::post(&self.path)).with_body(body)?;
        self.send(request).await
    }

    /// PUT a JSON body.
    pub async fn put<T, B>(&self, body: &B) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let request = self.request(ApiRequest::put(&self.path)).with_body(body)?;
        self.send(request).await
    }

    /// DELETE the endpoint.
    pub async fn delete<T: DeserializeOwned>(&self) -> Result<ApiResponse<T>> {
        self.send(self.request(ApiRequest::delete(&self.path))).await
    }

    /// DELETE the endpoint with query parameters.
    pub async fn delete_with_query<T, Q>(&self, query: &Q) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let request = self.request(ApiRequest::delete(&self.path)).with_query(query)?;
        self.send(request).await
    }

    fn request(&self, request: ApiRequest) -> ApiRequest {
        match &self.cancel {
            Some(token) => request.with_cancel(token.clone()),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<ApiResponse<T>> {
        self.client.send_json(request).await
    }
}
