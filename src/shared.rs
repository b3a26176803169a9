use std::sync::Arc;
use thiserror::Error;

use crate::api::{ApiError, HttpExecutor, RefreshCoordinator};
use crate::config::{ApiConfig, ConfigError};
use crate::session::{FileTokenStore, InMemoryTokenStore, SessionEvents, SessionService, TokenStore};
use crate::user::UserService;

#[derive(Error, Debug)]
pub enum AppError {
    /// Input rejected before any network call
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AppError {
    /// True when the session could not be renewed and the user must log in again
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, AppError::Api(ApiError::AuthExpired { .. }))
    }
}

/// Composition root: every long-lived handle, built once and passed by reference
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn TokenStore>,
    pub events: SessionEvents,
    pub executor: Arc<HttpExecutor>,
    pub client: Arc<RefreshCoordinator>,
    pub session: Arc<SessionService>,
    pub users: Arc<UserService>,
}

impl AppState {
    pub fn new(config: ApiConfig, store: Arc<dyn TokenStore>) -> Result<Self, AppError> {
        let events = SessionEvents::new();
        let executor = Arc::new(HttpExecutor::new(config.clone(), store.clone())?);
        let client = Arc::new(RefreshCoordinator::new(
            executor.clone(),
            store.clone(),
            events.clone(),
        ));
        let session = Arc::new(SessionService::new(
            executor.clone(),
            store.clone(),
            events.clone(),
        ));
        let users = Arc::new(UserService::new(client.clone()));

        Ok(Self {
            config,
            store,
            events,
            executor,
            client,
            session,
            users,
        })
    }

    /// Build with the store the configuration asks for: file-backed when a
    /// token file is configured, in-memory otherwise
    pub fn from_config(config: ApiConfig) -> Result<Self, AppError> {
        let store: Arc<dyn TokenStore> = match &config.token_file {
            Some(path) => Arc::new(FileTokenStore::new(path.clone())),
            None => Arc::new(InMemoryTokenStore::new()),
        };
        Self::new(config, store)
    }
}
