// Library crate for the Infinity admin API client
// This file exposes the public API for integration tests

pub mod api;
pub mod config;
pub mod session;
pub mod shared;
pub mod user;

// Re-export commonly used types for easier access in tests
pub use api::{ApiError, ApiRequest, HttpExecutor, RefreshCoordinator, ResponseBody};
pub use config::ApiConfig;
pub use session::{
    CredentialPair, FileTokenStore, InMemoryTokenStore, SessionEvent, SessionService,
    SessionUser, StorageKey, TokenStore,
};
pub use shared::{AppError, AppState};
pub use user::{UpdateProfile, UserProfile, UserService};
