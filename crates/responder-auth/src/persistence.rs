//! Persistence of the last auth response, so a session survives restarts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{AuthError, Result};
use crate::token::TokenResponse;

/// Auth response as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedAuth {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    pub expires_in: u64,
    pub token_type: String,
    #[serde(default)]
    pub expiration_date: Option<String>,
    /// When the access token was obtained (ms since epoch).
    pub obtained_at: i64,
    /// When the refresh token was obtained (ms since epoch). Older files
    /// lack it, in which case `obtained_at` applies to both tokens.
    #[serde(default)]
    pub refresh_token_obtained_at: Option<i64>,
}

impl PersistedAuth {
    /// Record a fresh token response obtained at `now`.
    pub fn from_response(response: &TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            access_token: response.access_token.clone(),
            refresh_token: response.rotated_refresh_token().map(str::to_string),
            id_token: response.id_token.clone(),
            expires_in: response.expires_in,
            token_type: response.token_type.clone(),
            expiration_date: expiration_date(now, response.expires_in),
            obtained_at: now.timestamp_millis(),
            refresh_token_obtained_at: response.rotated_refresh_token().map(|_| now.timestamp_millis()),
        }
    }

    pub fn access_token_obtained_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.obtained_at).single()
    }

    pub fn refresh_token_obtained_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.refresh_token_obtained_at.unwrap_or(self.obtained_at))
            .single()
    }
}

/// RFC 3339 instant `expires_in` seconds after `at`, or `None` when it is
/// out of range.
pub(crate) fn expiration_date(at: DateTime<Utc>, expires_in: u64) -> Option<String> {
    let secs = i64::try_from(expires_in).ok()?;
    let lifetime = chrono::Duration::try_seconds(secs)?;
    at.checked_add_signed(lifetime).map(|expires_at| expires_at.to_rfc3339())
}

// ============================================================================
// TokenPersistence Trait
// ============================================================================

/// Storage for the persisted auth response.
#[async_trait]
pub trait TokenPersistence: Send + Sync + std::fmt::Debug {
    /// Load the stored response, if any.
    async fn load(&self) -> Result<Option<PersistedAuth>>;

    /// Replace the stored response.
    async fn save(&self, auth: &PersistedAuth) -> Result<()>;

    /// Remove the stored response.
    async fn remove(&self) -> Result<()>;
}

/// Shared persistence for use across async contexts.
pub type SharedTokenPersistence = Arc<dyn TokenPersistence>;

// ============================================================================
// FileTokenPersistence
// ============================================================================

/// JSON file persistence with an in-memory cache.
#[derive(Debug)]
pub struct FileTokenPersistence {
    path: PathBuf,
    cached: RwLock<Option<PersistedAuth>>,
}

impl FileTokenPersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenPersistence for FileTokenPersistence {
    async fn load(&self) -> Result<Option<PersistedAuth>> {
        {
            let cache = self.cached.read().await;
            if cache.is_some() {
                return Ok(cache.clone());
            }
        }

        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AuthError::Storage(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let auth: PersistedAuth = serde_json::from_str(&content)?;

        let mut cache = self.cached.write().await;
        *cache = Some(auth.clone());

        Ok(Some(auth))
    }

    async fn save(&self, auth: &PersistedAuth) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AuthError::Storage(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let json = serde_json::to_string_pretty(auth)?;
        tokio::fs::write(&self.path, json).await.map_err(|e| {
            AuthError::Storage(format!("Failed to write {}: {}", self.path.display(), e))
        })?;

        let mut cache = self.cached.write().await;
        *cache = Some(auth.clone());

        tracing::debug!(path = %self.path.display(), "Auth response saved");
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        let mut cache = self.cached.write().await;
        *cache = None;

        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::Storage(format!(
                "Failed to delete {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

// ============================================================================
// MemoryTokenPersistence
// ============================================================================

/// Process-local persistence, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryTokenPersistence {
    stored: RwLock<Option<PersistedAuth>>,
}

impl MemoryTokenPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auth(auth: PersistedAuth) -> Self {
        Self {
            stored: RwLock::new(Some(auth)),
        }
    }
}

#[async_trait]
impl TokenPersistence for MemoryTokenPersistence {
    async fn load(&self) -> Result<Option<PersistedAuth>> {
        Ok(self.stored.read().await.clone())
    }

    async fn save(&self, auth: &PersistedAuth) -> Result<()> {
        *self.stored.write().await = Some(auth.clone());
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        *self.stored.write().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn response() -> TokenResponse {
        TokenResponse {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            id_token: Some("h.p.s".to_string()),
            expires_in: 3600,
            token_type: "Bearer".to_string(),
            expiration_date: None,
        }
    }

    #[tokio::test]
    async fn test_file_save_load_remove() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("auth-response.json");
        let persistence = FileTokenPersistence::new(&path);

        assert!(persistence.load().await.unwrap().is_none());

        let auth = PersistedAuth::from_response(&response(), Utc::now());
        persistence.save(&auth).await.unwrap();
        assert!(path.exists());

        // A fresh instance reads from disk rather than the cache.
        let reread = FileTokenPersistence::new(&path).load().await.unwrap().unwrap();
        assert_eq!(reread, auth);

        persistence.remove().await.unwrap();
        assert!(!path.exists());
        assert!(persistence.load().await.unwrap().is_none());

        // Removing twice is fine.
        persistence.remove().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_corrupt_content_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("auth-response.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = FileTokenPersistence::new(&path).load().await.unwrap_err();
        assert!(matches!(err, AuthError::Serialization(_)));
    }

    #[test]
    fn test_unrotated_response_has_no_refresh_timestamp() {
        let mut unrotated = response();
        unrotated.refresh_token = None;
        let now = Utc::now();
        let auth = PersistedAuth::from_response(&unrotated, now);

        assert!(auth.refresh_token.is_none());
        assert!(auth.refresh_token_obtained_at.is_none());
        // Falls back to obtained_at.
        assert_eq!(
            auth.refresh_token_obtained_at().unwrap().timestamp_millis(),
            now.timestamp_millis()
        );
    }

    #[test]
    fn test_out_of_range_expires_in_has_no_expiration_date() {
        let mut huge = response();
        huge.expires_in = 100_000_000_000_000;
        let now = Utc::now();
        let auth = PersistedAuth::from_response(&huge, now);

        assert!(auth.expiration_date.is_none());
        assert_eq!(auth.expires_in, 100_000_000_000_000);
        assert_eq!(auth.obtained_at, now.timestamp_millis());

        assert!(expiration_date(now, u64::MAX).is_none());
        assert!(expiration_date(now, 3600).is_some());
    }

    #[tokio::test]
    async fn test_memory_persistence() {
        let persistence = MemoryTokenPersistence::new();
        assert!(persistence.load().await.unwrap().is_none());

        let auth = PersistedAuth::from_response(&response(), Utc::now());
        persistence.save(&auth).await.unwrap();
        assert_eq!(persistence.load().await.unwrap(), Some(auth));

        persistence.remove().await.unwrap();
        assert!(persistence.load().await.unwrap().is_none());
    }
}
