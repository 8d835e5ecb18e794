//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [api]
//! base_url = "https://api.example.org"
//! api_version = "v4"
//! timeout_secs = 30
//!
//! [oauth]
//! token_path = "connect/token"
//! client_id = "responder-mobile"
//! scope = "openid profile email offline_access mobile"
//!
//! [tokens]
//! access_token_lifetime_secs = 3600
//! refresh_token_lifetime_days = 365
//! refresh_buffer_secs = 300
//!
//! [storage]
//! token_file = "/home/me/.config/responder/auth-response.json"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponderConfig {
    /// API location and transport settings.
    pub api: ApiConfig,
    /// OAuth client identity.
    pub oauth: OAuthSection,
    /// Token lifetimes and the proactive refresh window.
    pub tokens: TokensConfig,
    /// Where credentials are persisted.
    pub storage: StorageConfig,
}

impl ResponderConfig {
    /// Create a config populated with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the client cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(invalid("api.base_url", "must not be empty"));
        }
        if self.api.timeout_secs == 0 {
            return Err(invalid("api.timeout_secs", "must be greater than zero"));
        }
        if self.tokens.access_token_lifetime_secs == 0 {
            return Err(invalid(
                "tokens.access_token_lifetime_secs",
                "must be greater than zero",
            ));
        }
        if self.tokens.refresh_token_lifetime_days == 0 {
            return Err(invalid(
                "tokens.refresh_token_lifetime_days",
                "must be greater than zero",
            ));
        }
        if self.tokens.refresh_token_lifetime_days > MAX_REFRESH_TOKEN_LIFETIME_DAYS {
            return Err(invalid(
                "tokens.refresh_token_lifetime_days",
                &format!("must be at most {}", MAX_REFRESH_TOKEN_LIFETIME_DAYS),
            ));
        }
        if self.tokens.refresh_buffer_secs >= self.tokens.access_token_lifetime_secs {
            return Err(invalid(
                "tokens.refresh_buffer_secs",
                "must be shorter than the access token lifetime",
            ));
        }
        Ok(())
    }

    /// Root of the versioned REST API, always ending in `/`.
    ///
    /// `https://host` with version `v4` becomes `https://host/api/v4/`.
    pub fn api_root(&self) -> String {
        format!(
            "{}/api/{}/",
            self.api.base_url.trim_end_matches('/'),
            self.api.api_version.trim_matches('/')
        )
    }

    /// Absolute URL of the OAuth token endpoint.
    ///
    /// An absolute `token_path` is used as-is; a relative one is resolved
    /// against [`api_root`](Self::api_root).
    pub fn token_url(&self) -> String {
        let path = self.oauth.token_path.as_str();
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.api_root(), path.trim_start_matches('/'))
        }
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// Default API host.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Default API version segment.
pub const DEFAULT_API_VERSION: &str = "v4";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Longest refresh token lifetime accepted in `[tokens]`.
pub const MAX_REFRESH_TOKEN_LIFETIME_DAYS: u64 = 36_500;

/// `[api]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Scheme and host of the REST API.
    pub base_url: String,
    /// Version segment inserted after `/api/`.
    pub api_version: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// `[oauth]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSection {
    /// Token endpoint, relative to the API root or absolute.
    pub token_path: String,
    /// OAuth client identifier sent with every grant.
    pub client_id: String,
    /// Space-separated scopes requested at sign-in and refresh.
    pub scope: String,
}

impl Default for OAuthSection {
    fn default() -> Self {
        Self {
            token_path: "connect/token".to_string(),
            client_id: "responder-mobile".to_string(),
            scope: "openid profile email offline_access mobile".to_string(),
        }
    }
}

/// `[tokens]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokensConfig {
    /// Lifetime of an access token from the moment it is obtained.
    pub access_token_lifetime_secs: u64,
    /// Lifetime of a refresh token from the moment it is obtained.
    pub refresh_token_lifetime_days: u64,
    /// How long before access token expiry a proactive refresh starts.
    pub refresh_buffer_secs: u64,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime_secs: 3600,
            refresh_token_lifetime_days: 365,
            refresh_buffer_secs: 300,
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Persisted auth response. Defaults to `<config dir>/auth-response.json`.
    pub token_file: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the token file, falling back to the config directory.
    pub fn token_file_or_default(&self) -> Option<PathBuf> {
        self.token_file
            .clone()
            .or_else(|| crate::xdg_config_dir().map(|d| d.join(crate::discovery::TOKEN_FILE)))
    }
}
