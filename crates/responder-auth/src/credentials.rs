//! Credential state and expiry rules.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default access token lifetime (1 hour).
pub const ACCESS_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Default refresh token lifetime (365 days).
pub const REFRESH_TOKEN_LIFETIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Default window before access token expiry in which a refresh is started (5 minutes).
pub const REFRESH_BUFFER: Duration = Duration::from_secs(5 * 60);

/// Sign-in state of the current user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SignInStatus {
    /// Nothing loaded yet.
    #[default]
    Idle,
    /// A sign-in request is in flight.
    Loading,
    SignedIn,
    SignedOut,
    /// The last sign-in attempt failed.
    Error,
}

/// Claims read from the ID token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Subject; used as the user id.
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Remaining claims, kept verbatim.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Fixed token lifetimes and the proactive refresh window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access_token: Duration,
    pub refresh_token: Duration,
    pub refresh_buffer: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access_token: ACCESS_TOKEN_LIFETIME,
            refresh_token: REFRESH_TOKEN_LIFETIME,
            refresh_buffer: REFRESH_BUFFER,
        }
    }
}

impl TokenLifetimes {
    /// Build lifetimes from configured seconds/days.
    pub fn new(access_token_secs: u64, refresh_token_days: u64, refresh_buffer_secs: u64) -> Self {
        Self {
            access_token: Duration::from_secs(access_token_secs),
            refresh_token: Duration::from_secs(refresh_token_days.saturating_mul(24 * 60 * 60)),
            refresh_buffer: Duration::from_secs(refresh_buffer_secs),
        }
    }

    /// Age at which an access token counts as expiring soon.
    pub fn refresh_threshold(&self) -> Duration {
        self.access_token.saturating_sub(self.refresh_buffer)
    }
}

/// Credentials held for the current user.
///
/// Invariant: `status == SignedOut` implies both tokens are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub access_token_obtained_at: Option<DateTime<Utc>>,
    pub refresh_token_obtained_at: Option<DateTime<Utc>>,
    pub status: SignInStatus,
    pub user_id: Option<String>,
    pub profile: Option<Profile>,
    /// Message of the last failed sign-in.
    pub error: Option<String>,
}

impl Credentials {
    /// Cleared credentials.
    pub fn signed_out() -> Self {
        Self {
            status: SignInStatus::SignedOut,
            ..Default::default()
        }
    }

    /// Signed in with both tokens obtained at `now`.
    pub fn signed_in(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
            access_token_obtained_at: Some(now),
            refresh_token_obtained_at: Some(now),
            status: SignInStatus::SignedIn,
            ..Default::default()
        }
    }

    /// Signed in, tokens present and the refresh token still alive.
    pub fn is_authenticated_at(&self, lifetimes: &TokenLifetimes, now: DateTime<Utc>) -> bool {
        self.status == SignInStatus::SignedIn
            && self.access_token.is_some()
            && self.refresh_token.is_some()
            && !self.is_refresh_token_expired_at(lifetimes, now)
    }

    /// Access token has reached its lifetime. Missing data counts as expired.
    pub fn is_access_token_expired_at(&self, lifetimes: &TokenLifetimes, now: DateTime<Utc>) -> bool {
        match (&self.access_token, self.access_token_obtained_at) {
            (Some(_), Some(obtained_at)) => age(obtained_at, now) >= lifetimes.access_token,
            _ => true,
        }
    }

    /// Access token has at most `refresh_buffer` left. Missing data counts as expiring.
    pub fn is_access_token_expiring_soon_at(
        &self,
        lifetimes: &TokenLifetimes,
        now: DateTime<Utc>,
    ) -> bool {
        match (&self.access_token, self.access_token_obtained_at) {
            (Some(_), Some(obtained_at)) => age(obtained_at, now) >= lifetimes.refresh_threshold(),
            _ => true,
        }
    }

    /// Refresh token is older than its lifetime. Missing data counts as expired.
    pub fn is_refresh_token_expired_at(&self, lifetimes: &TokenLifetimes, now: DateTime<Utc>) -> bool {
        match (&self.refresh_token, self.refresh_token_obtained_at) {
            (Some(_), Some(obtained_at)) => age(obtained_at, now) > lifetimes.refresh_token,
            _ => true,
        }
    }

    /// A refresh may be attempted: both tokens held and the refresh token alive.
    pub fn should_refresh_token_at(&self, lifetimes: &TokenLifetimes, now: DateTime<Utc>) -> bool {
        self.access_token.is_some()
            && self.refresh_token.is_some()
            && !self.is_refresh_token_expired_at(lifetimes, now)
    }

    /// Apply a partial update.
    pub fn apply(&mut self, patch: CredentialPatch) {
        if let Some(token) = patch.access_token {
            self.access_token = Some(token);
        }
        if let Some(token) = patch.refresh_token {
            self.refresh_token = Some(token);
        }
        if let Some(at) = patch.access_token_obtained_at {
            self.access_token_obtained_at = Some(at);
        }
        if let Some(at) = patch.refresh_token_obtained_at {
            self.refresh_token_obtained_at = Some(at);
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if patch.clear_error {
            self.error = None;
        }
    }
}

/// Elapsed time since `obtained_at`; a timestamp in the future has age zero.
fn age(obtained_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - obtained_at).to_std().unwrap_or(Duration::ZERO)
}

/// Partial update of [`Credentials`]; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredentialPatch {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub access_token_obtained_at: Option<DateTime<Utc>>,
    pub refresh_token_obtained_at: Option<DateTime<Utc>>,
    pub status: Option<SignInStatus>,
    pub clear_error: bool,
}

impl CredentialPatch {
    /// Patch for a successful refresh.
    ///
    /// The access token and its timestamp always change. The refresh token
    /// and its timestamp change only when the server rotated it.
    pub fn refreshed(
        access_token: impl Into<String>,
        rotated_refresh_token: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let refresh_token_obtained_at = rotated_refresh_token.as_ref().map(|_| now);
        Self {
            access_token: Some(access_token.into()),
            refresh_token: rotated_refresh_token,
            access_token_obtained_at: Some(now),
            refresh_token_obtained_at,
            status: Some(SignInStatus::SignedIn),
            clear_error: true,
        }
    }
}
