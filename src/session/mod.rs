// Public API - what other modules can use
pub use events::{SessionEvent, SessionEvents};
pub use models::{CredentialPair, SessionUser};
pub use service::SessionService;
pub use store::{FileTokenStore, InMemoryTokenStore, StorageKey, TokenStore};

pub mod events;
pub mod models;
pub mod service;
pub mod store;
