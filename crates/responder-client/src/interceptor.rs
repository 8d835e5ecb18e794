//! Request and response interceptors.
//!
//! [`ResponderClient::authorize`] runs before a request is first sent and
//! refreshes an access token that is about to expire.
//! [`ResponderClient::recover`] runs when a sent request fails and turns a
//! 401 into at most one refresh-and-replay.

use chrono::Utc;
use reqwest::header::AUTHORIZATION;
use responder_auth::{AuthError, CredentialPatch};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use crate::classify::is_transient;
use crate::client::ResponderClient;
use crate::error::{Error, Result};
use crate::refresh::Admission;
use crate::request::{ApiRequest, ApiResponse, RetryContext, bearer_header};

impl ResponderClient {
    /// Attach the bearer token, refreshing it first if it expires soon.
    ///
    /// A failed proactive refresh is not fatal: the request goes out with the
    /// token held before the attempt and the session is left as it was.
    pub(crate) async fn authorize(&self, request: &mut ApiRequest) -> Result<()> {
        let store = &self.inner().credentials;

        if !store.is_authenticated() {
            return Ok(());
        }

        let current = store.snapshot();
        if !self.is_refreshing()
            && store.is_access_token_expiring_soon()
            && store.should_refresh_token()
        {
            info!(
                user_id = ?current.user_id,
                "Access token expiring soon, refreshing before API call"
            );

            let fallback = current.access_token;
            match store.refresh_access_token().await {
                Ok(()) => {
                    if let Some(token) = store.snapshot().access_token {
                        request.set_bearer(&token)?;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to refresh token in request interceptor");
                    if let Some(token) = fallback {
                        request.set_bearer(&token)?;
                    }
                }
            }
        } else if let Some(token) = current.access_token {
            request.set_bearer(&token)?;
        }

        Ok(())
    }

    /// Handle a failed request.
    ///
    /// Anything other than a first 401 is returned unchanged. A 401 either
    /// ends the session (refresh token expired), waits for the refresh that
    /// is already running, or runs the refresh itself and publishes the
    /// outcome to everyone who waited. After a failed refresh the gate only
    /// reopens once any forced logout is complete.
    pub(crate) async fn recover<T: DeserializeOwned>(
        &self,
        mut ctx: RetryContext,
        err: Error,
    ) -> Result<ApiResponse<T>> {
        if err.status() != Some(401) || ctx.retried() {
            return Err(err);
        }

        let store = &self.inner().credentials;

        if store.is_refresh_token_expired() {
            error!(
                user_id = ?store.snapshot().user_id,
                "Refresh token expired, forcing logout"
            );
            self.set_default_authorization(None);
            store.logout(Some("Refresh token expired")).await;
            return Err(err);
        }

        ctx.mark_retried();

        let mut lease = match self.inner().gate.admit() {
            Admission::Follower(waiter) => {
                debug!(path = %ctx.request.path, "Token refresh in progress, queueing request");
                waiter.wait().await?;
                if let Some(token) = store.snapshot().access_token {
                    ctx.request.set_bearer(&token)?;
                }
                return self.dispatch(&ctx.request).await;
            }
            Admission::Leader(lease) => lease,
        };

        match self.refresh_via_endpoint().await {
            Ok(access_token) => {
                let header = bearer_header(&access_token)?;
                self.set_default_authorization(Some(header.clone()));
                lease.settle(Ok(()));

                ctx.request.headers.insert(AUTHORIZATION, header);
                self.dispatch(&ctx.request).await
            }
            Err(e) => {
                // The gate stays closed until logout has finished, so a 401
                // landing meanwhile gets this error instead of a new attempt.
                lease.publish(Err(e.clone()));

                let user_id = store.snapshot().user_id;
                if is_transient(&e) {
                    warn!(
                        user_id = ?user_id,
                        error = %e,
                        "Transient token refresh error, not logging out"
                    );
                } else {
                    error!(
                        user_id = ?user_id,
                        error = %e,
                        "Permanent token refresh failure, forcing logout"
                    );
                    self.set_default_authorization(None);
                    store.logout(Some("Token refresh failed permanently")).await;
                }
                lease.release();
                Err(Error::Refresh(e))
            }
        }
    }

    /// Exchange the held refresh token for a new access token and store it.
    async fn refresh_via_endpoint(&self) -> std::result::Result<String, AuthError> {
        let store = &self.inner().credentials;
        let refresh_token = store
            .snapshot()
            .refresh_token
            .ok_or(AuthError::NoRefreshToken)?;

        let response = self.inner().token_endpoint.refresh(&refresh_token).await?;

        store
            .apply(CredentialPatch::refreshed(
                response.access_token.clone(),
                response.rotated_refresh_token().map(str::to_string),
                Utc::now(),
            ))
            .await;

        info!("Access token refreshed after 401");
        Ok(response.access_token)
    }
}
