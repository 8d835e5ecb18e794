//! CLI command handlers.

pub mod auth;
pub mod request;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use responder_auth::{
    AuthStore, FileTokenPersistence, HttpTokenEndpoint, HydrateOutcome, OAuthConfig,
    TokenLifetimes,
};
use responder_client::ResponderClient;
use responder_config::ResponderConfig;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Effective configuration.
    pub config: ResponderConfig,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

/// A restored session: the credential store and a client bound to it.
pub struct Session {
    pub store: Arc<AuthStore>,
    pub client: ResponderClient,
    pub hydrated: HydrateOutcome,
}

impl Context {
    /// Build the store and client from config and restore the saved session.
    pub async fn session(&self) -> Result<Session> {
        let config = &self.config;

        let token_file = config
            .storage
            .token_file_or_default()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        let endpoint = Arc::new(HttpTokenEndpoint::new(OAuthConfig::new(
            config.token_url(),
            &config.oauth.client_id,
            &config.oauth.scope,
        )));

        let lifetimes = TokenLifetimes::new(
            config.tokens.access_token_lifetime_secs,
            config.tokens.refresh_token_lifetime_days,
            config.tokens.refresh_buffer_secs,
        );

        let store = Arc::new(
            AuthStore::new(endpoint.clone(), Arc::new(FileTokenPersistence::new(token_file)))
                .with_lifetimes(lifetimes),
        );

        let client = ResponderClient::builder()
            .base_url(&config.api.base_url)
            .api_version(&config.api.api_version)
            .timeout(Duration::from_secs(config.api.timeout_secs))
            .credentials(store.clone())
            .token_endpoint(endpoint)
            .build()?;

        let hydrated = store.restore_session().await;

        Ok(Session {
            store,
            client,
            hydrated,
        })
    }
}
