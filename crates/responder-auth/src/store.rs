//! Credential store: the single owner of the user's tokens.
//!
//! [`CredentialStore`] is the contract the HTTP client consumes; [`AuthStore`]
//! is the implementation backed by a [`TokenEndpoint`] and a
//! [`TokenPersistence`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::credentials::{CredentialPatch, Credentials, Profile, SignInStatus, TokenLifetimes};
use crate::error::{AuthError, Result};
use crate::jwt::decode_profile;
use crate::persistence::{PersistedAuth, SharedTokenPersistence, expiration_date};
use crate::token::{LoginCredentials, TokenEndpoint, TokenResponse};

// ============================================================================
// CredentialStore Trait
// ============================================================================

/// Access to the current user's credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync + std::fmt::Debug {
    /// Copy of the current state.
    fn snapshot(&self) -> Credentials;

    /// Signed in with both tokens and a live refresh token.
    fn is_authenticated(&self) -> bool;

    /// The access token has at most the refresh buffer left.
    fn is_access_token_expiring_soon(&self) -> bool;

    /// A refresh is permitted: tokens held and the refresh token alive.
    fn should_refresh_token(&self) -> bool;

    /// The refresh token is past its lifetime.
    fn is_refresh_token_expired(&self) -> bool;

    /// Mint a new access token through the token endpoint and store it.
    async fn refresh_access_token(&self) -> Result<()>;

    /// Clear all credentials. `reason` marks a forced logout.
    async fn logout(&self, reason: Option<&str>);

    /// Patch the state directly.
    async fn apply(&self, patch: CredentialPatch);
}

/// Shared credential store for use across async contexts.
pub type SharedCredentialStore = Arc<dyn CredentialStore>;

/// Result of restoring a session from persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HydrateOutcome {
    SignedOut,
    SignedIn {
        user_id: String,
        /// The restored access token is already past its lifetime.
        access_token_expired: bool,
    },
}

// ============================================================================
// AuthStore
// ============================================================================

/// Credential store backed by an OAuth2 token endpoint.
#[derive(Debug)]
pub struct AuthStore {
    state: RwLock<Credentials>,
    endpoint: Arc<dyn TokenEndpoint>,
    persistence: SharedTokenPersistence,
    lifetimes: TokenLifetimes,
}

impl AuthStore {
    /// Create an idle store with default token lifetimes.
    pub fn new(endpoint: Arc<dyn TokenEndpoint>, persistence: SharedTokenPersistence) -> Self {
        Self {
            state: RwLock::new(Credentials::default()),
            endpoint,
            persistence,
            lifetimes: TokenLifetimes::default(),
        }
    }

    /// Override the token lifetimes.
    pub fn with_lifetimes(mut self, lifetimes: TokenLifetimes) -> Self {
        self.lifetimes = lifetimes;
        self
    }

    /// Start from the given credentials instead of an idle state.
    pub fn with_credentials(self, credentials: Credentials) -> Self {
        *self.state.write() = credentials;
        self
    }

    pub fn lifetimes(&self) -> &TokenLifetimes {
        &self.lifetimes
    }

    pub fn user_id(&self) -> Option<String> {
        self.state.read().user_id.clone()
    }

    /// Sign in with a username and password.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<Profile> {
        self.state.write().status = SignInStatus::Loading;

        match self.try_login(credentials).await {
            Ok(profile) => Ok(profile),
            Err(e) => {
                error!(username = %credentials.username, error = %e, "Login failed");
                let mut state = self.state.write();
                state.status = SignInStatus::Error;
                state.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn try_login(&self, credentials: &LoginCredentials) -> Result<Profile> {
        let response = self.endpoint.login(credentials).await?;

        let id_token = response
            .id_token
            .as_deref()
            .ok_or_else(|| AuthError::InvalidIdToken("No ID token received".to_string()))?;
        let profile = decode_profile(id_token)?;
        let refresh_token = response
            .rotated_refresh_token()
            .ok_or(AuthError::NoRefreshToken)?
            .to_string();

        let now = Utc::now();
        if let Err(e) = self
            .persistence
            .save(&PersistedAuth::from_response(&response, now))
            .await
        {
            warn!(error = %e, "Failed to persist auth response after login");
        }

        {
            let mut state = self.state.write();
            *state = Credentials::signed_in(response.access_token.clone(), refresh_token, now);
            state.user_id = Some(profile.sub.clone());
            state.profile = Some(profile.clone());
        }

        info!(
            username = %credentials.username,
            user_id = %profile.sub,
            obtained_at = now.timestamp_millis(),
            "User successfully logged in"
        );
        Ok(profile)
    }

    /// Restore the session saved by a previous run.
    ///
    /// Any failure leaves the store signed out.
    pub async fn hydrate(&self) -> HydrateOutcome {
        debug!("Hydrating auth state");

        let persisted = match self.persistence.load().await {
            Ok(Some(auth)) => auth,
            Ok(None) => {
                info!("No valid auth response found during hydration");
                *self.state.write() = Credentials::signed_out();
                return HydrateOutcome::SignedOut;
            }
            Err(e) => {
                error!(error = %e, "Error during auth hydration, setting to signed out");
                *self.state.write() = Credentials::signed_out();
                return HydrateOutcome::SignedOut;
            }
        };

        match self.restore(&persisted) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Error during auth hydration, setting to signed out");
                *self.state.write() = Credentials::signed_out();
                HydrateOutcome::SignedOut
            }
        }
    }

    /// Hydrate, then refresh right away if the restored access token has
    /// already expired.
    ///
    /// A failed refresh is logged and the session kept; the next 401 goes
    /// through the client's reactive refresh.
    pub async fn restore_session(&self) -> HydrateOutcome {
        let outcome = self.hydrate().await;

        if let HydrateOutcome::SignedIn {
            user_id,
            access_token_expired: true,
        } = &outcome
        {
            info!(user_id = %user_id, "Restored access token expired, refreshing");
            if let Err(e) = self.refresh_tokens().await {
                warn!(
                    user_id = %user_id,
                    error = %e,
                    "Refresh after hydration failed, keeping session"
                );
            }
        }

        outcome
    }

    fn restore(&self, persisted: &PersistedAuth) -> Result<HydrateOutcome> {
        let id_token = persisted
            .id_token
            .as_deref()
            .ok_or_else(|| AuthError::InvalidIdToken("No ID token persisted".to_string()))?;
        let profile = decode_profile(id_token)?;
        let refresh_token = persisted
            .refresh_token
            .clone()
            .ok_or(AuthError::NoRefreshToken)?;

        let now = Utc::now();
        let credentials = Credentials {
            access_token: Some(persisted.access_token.clone()),
            refresh_token: Some(refresh_token),
            access_token_obtained_at: persisted.access_token_obtained_at(),
            refresh_token_obtained_at: persisted.refresh_token_obtained_at(),
            status: SignInStatus::SignedIn,
            user_id: Some(profile.sub.clone()),
            profile: Some(profile.clone()),
            error: None,
        };

        if credentials.is_refresh_token_expired_at(&self.lifetimes, now) {
            error!(
                user_id = %profile.sub,
                obtained_at = persisted.obtained_at,
                "Refresh token expired during hydration, forcing logout"
            );
            *self.state.write() = Credentials::signed_out();
            return Ok(HydrateOutcome::SignedOut);
        }

        let access_token_expired = credentials.is_access_token_expired_at(&self.lifetimes, now);
        *self.state.write() = credentials;

        info!(user_id = %profile.sub, access_token_expired, "Successfully hydrated auth state");
        Ok(HydrateOutcome::SignedIn {
            user_id: profile.sub,
            access_token_expired,
        })
    }

    /// Refresh through the endpoint and store the result.
    async fn refresh_tokens(&self) -> Result<TokenResponse> {
        let (refresh_token, user_id) = {
            let state = self.state.read();
            (state.refresh_token.clone(), state.user_id.clone())
        };

        let Some(refresh_token) = refresh_token else {
            error!(user_id = ?user_id, "No refresh token available for token refresh");
            return Err(AuthError::NoRefreshToken);
        };

        if self.is_refresh_token_expired() {
            error!(user_id = ?user_id, "Refresh token expired, cannot refresh");
            return Err(AuthError::RefreshTokenExpired);
        }

        info!(user_id = ?user_id, "Attempting to refresh access token");

        let response = match self.endpoint.refresh(&refresh_token).await {
            Ok(response) => response,
            Err(e) => {
                warn!(user_id = ?user_id, error = %e, "Failed to refresh access token");
                return Err(e);
            }
        };

        let now = Utc::now();
        self.apply(CredentialPatch::refreshed(
            response.access_token.clone(),
            response.rotated_refresh_token().map(str::to_string),
            now,
        ))
        .await;

        info!(
            user_id = ?user_id,
            new_access_token_obtained_at = now.timestamp_millis(),
            "Successfully refreshed access token"
        );
        Ok(response)
    }

    /// Write the current tokens back into the persisted auth response.
    async fn persist_current(&self) {
        let credentials = self.snapshot();
        let Some(access_token) = credentials.access_token else {
            return;
        };

        let mut persisted = match self.persistence.load().await {
            Ok(Some(persisted)) => persisted,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Failed to load auth response for update");
                return;
            }
        };

        persisted.access_token = access_token;
        persisted.refresh_token = credentials.refresh_token;
        if let Some(at) = credentials.access_token_obtained_at {
            persisted.obtained_at = at.timestamp_millis();
            persisted.expiration_date = expiration_date(at, persisted.expires_in);
        }
        persisted.refresh_token_obtained_at = credentials
            .refresh_token_obtained_at
            .map(|at| at.timestamp_millis());

        if let Err(e) = self.persistence.save(&persisted).await {
            warn!(error = %e, "Failed to persist refreshed tokens");
        }
    }

    /// Refresh the access token `refresh_buffer` before it expires, then keep
    /// doing so after every successful refresh.
    ///
    /// Stops when the user is no longer authenticated or a refresh fails.
    pub fn spawn_auto_refresh(self: Arc<Self>, expires_in: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut expires_in = expires_in;
            loop {
                let delay = expires_in.saturating_sub(self.lifetimes.refresh_buffer);
                if delay.is_zero() {
                    return;
                }
                tokio::time::sleep(delay).await;

                if !(self.is_authenticated() && self.should_refresh_token()) {
                    debug!("Skipping auto-refresh, session no longer refreshable");
                    return;
                }

                info!(user_id = ?self.user_id(), "Auto-refreshing token before expiry");
                match self.refresh_tokens().await {
                    Ok(response) => expires_in = Duration::from_secs(response.expires_in),
                    Err(e) => {
                        warn!(error = %e, "Auto-refresh failed, waiting for the next request");
                        return;
                    }
                }
            }
        })
    }
}

#[async_trait]
impl CredentialStore for AuthStore {
    fn snapshot(&self) -> Credentials {
        self.state.read().clone()
    }

    fn is_authenticated(&self) -> bool {
        self.state.read().is_authenticated_at(&self.lifetimes, Utc::now())
    }

    fn is_access_token_expiring_soon(&self) -> bool {
        self.state
            .read()
            .is_access_token_expiring_soon_at(&self.lifetimes, Utc::now())
    }

    fn should_refresh_token(&self) -> bool {
        self.state.read().should_refresh_token_at(&self.lifetimes, Utc::now())
    }

    fn is_refresh_token_expired(&self) -> bool {
        self.state
            .read()
            .is_refresh_token_expired_at(&self.lifetimes, Utc::now())
    }

    async fn refresh_access_token(&self) -> Result<()> {
        self.refresh_tokens().await.map(|_| ())
    }

    async fn logout(&self, reason: Option<&str>) {
        let current = self.snapshot();
        let was_authenticated = current.is_authenticated_at(&self.lifetimes, Utc::now());

        match reason {
            Some(reason) if was_authenticated => error!(
                user_id = ?current.user_id,
                reason,
                access_token_obtained_at = ?current.access_token_obtained_at,
                refresh_token_obtained_at = ?current.refresh_token_obtained_at,
                "User forced to logout due to authentication issue"
            ),
            _ if was_authenticated => {
                info!(user_id = ?current.user_id, "User logged out voluntarily")
            }
            _ => {}
        }

        if let Err(e) = self.persistence.remove().await {
            warn!(error = %e, reason = ?reason, "Failed to remove auth response during logout");
        }

        *self.state.write() = Credentials::signed_out();
    }

    async fn apply(&self, patch: CredentialPatch) {
        self.state.write().apply(patch);
        self.persist_current().await;
    }
}
