use std::sync::Arc;
use std::time::Duration;

use infinity_admin::{
    ApiConfig, AppState, CredentialPair, InMemoryTokenStore, SessionUser, TokenStore,
};

use super::mock_backend::{MockBackend, VALID_EMAIL};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestSetup {
    pub backend: MockBackend,
    pub store: Arc<InMemoryTokenStore>,
    pub state: AppState,
    /// Access token stored at setup, if a session was requested
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

pub struct TestSetupBuilder {
    timeout: Duration,
    with_session: bool,
    with_refresh_token: bool,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            with_session: false,
            with_refresh_token: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Start with a stored session the backend accepts
    pub fn with_session(mut self) -> Self {
        self.with_session = true;
        self
    }

    /// Start with a stored session that has no refresh token
    pub fn without_refresh_token(mut self) -> Self {
        self.with_session = true;
        self.with_refresh_token = false;
        self
    }

    pub async fn build(self) -> TestSetup {
        let backend = MockBackend::start().await;
        let store = Arc::new(InMemoryTokenStore::new());

        let (access_token, refresh_token) = if self.with_session {
            let (access, refresh) = backend.issue_session();
            let refresh = self.with_refresh_token.then_some(refresh);
            store
                .save_session(
                    &CredentialPair::new(access.clone(), refresh.clone()),
                    &test_user(),
                )
                .await
                .expect("seeding the store should succeed");
            (Some(access), refresh)
        } else {
            (None, None)
        };

        let config = ApiConfig::default()
            .with_base_url(backend.base_url())
            .with_timeout(self.timeout);
        let state = AppState::new(config, store.clone()).expect("state should build");

        TestSetup {
            backend,
            store,
            state,
            access_token,
            refresh_token,
        }
    }
}

impl TestSetup {
    /// Make the stored access token stale on the backend side
    pub fn expire_stored_token(&self) {
        let token = self
            .access_token
            .as_deref()
            .expect("setup has no stored session");
        self.backend.expire_access_token(token);
    }

    pub async fn stored_access_token(&self) -> Option<String> {
        self.store.access_token().await.unwrap()
    }
}

pub fn test_user() -> SessionUser {
    SessionUser {
        id: "u-1".to_string(),
        email: VALID_EMAIL.to_string(),
        name: Some("Ada Admin".to_string()),
        role: Some("admin".to_string()),
    }
}
