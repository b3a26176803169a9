use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{
    events::{SessionEvent, SessionEvents},
    models::{LoginOutcome, SessionUser},
    store::TokenStore,
};
use crate::api::{ApiError, ApiRequest, HttpExecutor};
use crate::shared::AppError;

pub const LOGIN_PATH: &str = "/user/login";
pub const LOGOUT_PATH: &str = "/user/logout";

pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Login, logout and cached-identity access for the rest of the application
pub struct SessionService {
    executor: Arc<HttpExecutor>,
    store: Arc<dyn TokenStore>,
    events: SessionEvents,
    login_endpoint: String,
    logout_endpoint: String,
}

impl SessionService {
    pub fn new(
        executor: Arc<HttpExecutor>,
        store: Arc<dyn TokenStore>,
        events: SessionEvents,
    ) -> Self {
        let login_endpoint = executor.config().endpoint(LOGIN_PATH);
        let logout_endpoint = executor.config().endpoint(LOGOUT_PATH);
        Self {
            executor,
            store,
            events,
            login_endpoint,
            logout_endpoint,
        }
    }

    /// Authenticate and persist the resulting session.
    ///
    /// Input is validated before any network call. Nothing is persisted
    /// unless the backend accepts the credentials and returns a token.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionUser, AppError> {
        validate_credentials(email, password)?;

        info!("Logging in");

        let request = ApiRequest::post(
            self.login_endpoint.clone(),
            json!({ "email": email, "password": password }),
        );

        let body = match self.executor.execute_anonymous(&request).await {
            Ok(body) => body,
            Err(e) => {
                warn!(status = e.status(), error = %e, "Login rejected");
                return Err(e.into());
            }
        };

        let outcome = body
            .unwrap_data()
            .and_then(|payload| LoginOutcome::from_payload(payload, email))
            .ok_or_else(|| {
                warn!("Login response carried no token");
                ApiError::Decode {
                    message: "Login succeeded but no authentication token was received"
                        .to_string(),
                }
            })?;

        self.store
            .save_session(&outcome.credentials, &outcome.user)
            .await?;

        info!(user_id = %outcome.user.id, "Login successful, session stored");
        self.events.emit(SessionEvent::LoggedIn {
            user: outcome.user.clone(),
        });

        Ok(outcome.user)
    }

    /// End the session. The server is notified best-effort; local state is
    /// cleared regardless of how that call goes.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), AppError> {
        let request = ApiRequest::post(self.logout_endpoint.clone(), json!({}));
        if let Err(e) = self.executor.execute(&request, None).await {
            warn!(status = e.status(), error = %e, "Logout notification failed, clearing local session anyway");
        }

        self.store.clear().await?;

        info!("Logged out");
        self.events.emit(SessionEvent::LoggedOut);
        Ok(())
    }

    /// Cached user, without any network I/O
    pub async fn get_current_user(&self) -> Option<SessionUser> {
        match self.store.user().await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Could not read cached user");
                None
            }
        }
    }

    /// True iff both a cached user and an access token are present
    pub async fn is_authenticated(&self) -> bool {
        let has_token = matches!(self.store.access_token().await, Ok(Some(_)));
        has_token && self.get_current_user().await.is_some()
    }

    /// Reload the persisted session at startup.
    ///
    /// A half-present session (user without token, or token without user) is
    /// cleared so the two never exist apart.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<Option<SessionUser>, AppError> {
        let token = self.store.access_token().await?;
        let user = self.store.user().await?;

        match (token, user) {
            (Some(_), Some(user)) => {
                info!(user_id = %user.id, "Restored session");
                Ok(Some(user))
            }
            (None, None) => Ok(None),
            _ => {
                warn!("Found partial session state, clearing it");
                self.store.clear().await?;
                Ok(None)
            }
        }
    }

    pub fn events(&self) -> &SessionEvents {
        &self.events
    }
}

/// Client-side checks applied before a login reaches the network
pub fn validate_credentials(email: &str, password: &str) -> Result<(), AppError> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation(
            "Please enter a valid email address".to_string(),
        ));
    }

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    Ok(())
}
