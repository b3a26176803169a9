use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument, warn};

use super::models::{CredentialPair, SessionUser};
use crate::shared::AppError;

pub const ACCESS_TOKEN_KEY: &str = "infinity_token";
pub const REFRESH_TOKEN_KEY: &str = "infinity_refresh_token";
pub const USER_KEY: &str = "infinity_user";

/// Keys of the persisted session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKey {
    AccessToken,
    RefreshToken,
    User,
}

impl StorageKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::AccessToken => ACCESS_TOKEN_KEY,
            StorageKey::RefreshToken => REFRESH_TOKEN_KEY,
            StorageKey::User => USER_KEY,
        }
    }
}

/// Persistent client-side storage for credentials and the cached user
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn access_token(&self) -> Result<Option<String>, AppError>;
    async fn refresh_token(&self) -> Result<Option<String>, AppError>;
    async fn user(&self) -> Result<Option<SessionUser>, AppError>;

    /// Persist a fresh login: credentials and user are written together
    async fn save_session(
        &self,
        credentials: &CredentialPair,
        user: &SessionUser,
    ) -> Result<(), AppError>;

    /// Store tokens renewed from the refresh token `exchanged`: the access
    /// token, and the refresh token when one was issued.
    ///
    /// Nothing is written and `false` is returned when `exchanged` is no
    /// longer the stored refresh token, i.e. the session was cleared or
    /// replaced while the exchange was in flight.
    async fn save_tokens(
        &self,
        exchanged: &str,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<bool, AppError>;

    /// Remove a single key
    async fn remove(&self, key: StorageKey) -> Result<(), AppError>;

    /// Remove credentials and user together
    async fn clear(&self) -> Result<(), AppError>;
}

/// On-disk / in-memory document. Field names are the storage keys; the user
/// is kept as serialized JSON the same way it is written to disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct StoredSession {
    #[serde(rename = "infinity_token", default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(rename = "infinity_refresh_token", default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(rename = "infinity_user", default, skip_serializing_if = "Option::is_none")]
    user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    saved_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl StoredSession {
    /// Decode the cached user; a corrupt record is dropped
    fn decode_user(&mut self) -> Option<SessionUser> {
        let raw = self.user.as_ref()?;
        match serde_json::from_str(raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable cached user record");
                self.user = None;
                None
            }
        }
    }

    fn set_session(&mut self, credentials: &CredentialPair, user: &SessionUser) -> Result<(), AppError> {
        let user_json =
            serde_json::to_string(user).map_err(|e| AppError::Storage(e.to_string()))?;
        self.access_token = Some(credentials.access_token.clone());
        self.refresh_token = credentials.refresh_token.clone();
        self.user = Some(user_json);
        self.saved_at = Some(chrono::Utc::now());
        Ok(())
    }

    fn set_tokens(&mut self, exchanged: &str, access_token: &str, refresh_token: Option<&str>) -> bool {
        if self.refresh_token.as_deref() != Some(exchanged) {
            return false;
        }
        self.access_token = Some(access_token.to_string());
        if let Some(refresh) = refresh_token {
            self.refresh_token = Some(refresh.to_string());
        }
        self.saved_at = Some(chrono::Utc::now());
        true
    }

    fn remove(&mut self, key: StorageKey) {
        match key {
            StorageKey::AccessToken => self.access_token = None,
            StorageKey::RefreshToken => self.refresh_token = None,
            StorageKey::User => self.user = None,
        }
    }

    fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.user.is_none()
    }
}

/// In-memory implementation of TokenStore for development and testing
///
/// Data is lost when the process exits.
pub struct InMemoryTokenStore {
    state: RwLock<StoredSession>,
}

impl Default for InMemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoredSession::default()),
        }
    }

    /// Creates a store that already holds a logged-in session
    pub fn with_session(credentials: CredentialPair, user: SessionUser) -> Result<Self, AppError> {
        let mut state = StoredSession::default();
        state.set_session(&credentials, &user)?;
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Store the raw value for a key, bypassing the typed API
    pub async fn set_raw(&self, key: StorageKey, value: impl Into<String>) {
        let value = Some(value.into());
        let mut state = self.state.write().await;
        match key {
            StorageKey::AccessToken => state.access_token = value,
            StorageKey::RefreshToken => state.refresh_token = value,
            StorageKey::User => state.user = value,
        }
    }

    /// True when no key holds a value
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.is_empty()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn access_token(&self) -> Result<Option<String>, AppError> {
        Ok(self.state.read().await.access_token.clone())
    }

    async fn refresh_token(&self) -> Result<Option<String>, AppError> {
        Ok(self.state.read().await.refresh_token.clone())
    }

    async fn user(&self) -> Result<Option<SessionUser>, AppError> {
        Ok(self.state.write().await.decode_user())
    }

    #[instrument(skip_all)]
    async fn save_session(
        &self,
        credentials: &CredentialPair,
        user: &SessionUser,
    ) -> Result<(), AppError> {
        debug!(user_id = %user.id, "Saving session in memory");
        self.state.write().await.set_session(credentials, user)
    }

    #[instrument(skip_all)]
    async fn save_tokens(
        &self,
        exchanged: &str,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<bool, AppError> {
        debug!(rotated_refresh = refresh_token.is_some(), "Saving tokens in memory");
        Ok(self
            .state
            .write()
            .await
            .set_tokens(exchanged, access_token, refresh_token))
    }

    async fn remove(&self, key: StorageKey) -> Result<(), AppError> {
        debug!(key = key.as_str(), "Removing key from memory");
        self.state.write().await.remove(key);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<(), AppError> {
        debug!("Clearing session from memory");
        *self.state.write().await = StoredSession::default();
        Ok(())
    }
}

/// JSON-file implementation of TokenStore
///
/// Every write replaces the whole document through a temp file and a rename,
/// so a crash mid-write leaves the previous state intact.
pub struct FileTokenStore {
    path: PathBuf,
    // Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<StoredSession, AppError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoredSession::default())
            }
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "Failed to read token file");
                return Err(AppError::Storage(e.to_string()));
            }
        };

        match serde_json::from_str(&raw) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "Token file is corrupt, ignoring it");
                Ok(StoredSession::default())
            }
        }
    }

    async fn persist(&self, state: &StoredSession) -> Result<(), AppError> {
        if state.is_empty() {
            return match tokio::fs::remove_file(&self.path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(AppError::Storage(e.to_string())),
            };
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
        }

        let json =
            serde_json::to_vec_pretty(state).map_err(|e| AppError::Storage(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            warn!(error = %e, path = %self.path.display(), "Failed to replace token file");
            AppError::Storage(e.to_string())
        })
    }

    async fn update<F, R>(&self, apply: F) -> Result<R, AppError>
    where
        F: FnOnce(&mut StoredSession) -> Result<R, AppError> + Send,
        R: Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load().await?;
        let applied = apply(&mut state)?;
        self.persist(&state).await?;
        Ok(applied)
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn access_token(&self) -> Result<Option<String>, AppError> {
        Ok(self.load().await?.access_token)
    }

    async fn refresh_token(&self) -> Result<Option<String>, AppError> {
        Ok(self.load().await?.refresh_token)
    }

    async fn user(&self) -> Result<Option<SessionUser>, AppError> {
        let mut state = self.load().await?;
        let had_record = state.user.is_some();
        match state.decode_user() {
            Some(user) => Ok(Some(user)),
            None if had_record => {
                // Drop a corrupt record so it is not re-read on every call
                let _guard = self.write_lock.lock().await;
                let mut current = self.load().await?;
                if current.decode_user().is_none() {
                    self.persist(&current).await?;
                }
                Ok(None)
            }
            None => Ok(None),
        }
    }

    #[instrument(skip_all, fields(path = %self.path.display()))]
    async fn save_session(
        &self,
        credentials: &CredentialPair,
        user: &SessionUser,
    ) -> Result<(), AppError> {
        debug!(user_id = %user.id, "Saving session to file");
        self.update(|state| state.set_session(credentials, user)).await
    }

    #[instrument(skip_all, fields(path = %self.path.display()))]
    async fn save_tokens(
        &self,
        exchanged: &str,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<bool, AppError> {
        debug!(rotated_refresh = refresh_token.is_some(), "Saving tokens to file");
        self.update(|state| Ok(state.set_tokens(exchanged, access_token, refresh_token)))
            .await
    }

    async fn remove(&self, key: StorageKey) -> Result<(), AppError> {
        debug!(key = key.as_str(), path = %self.path.display(), "Removing key from file");
        self.update(|state| {
            state.remove(key);
            Ok(())
        })
        .await
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn clear(&self) -> Result<(), AppError> {
        debug!("Clearing session file");
        let _guard = self.write_lock.lock().await;
        self.persist(&StoredSession::default()).await
    }
}
