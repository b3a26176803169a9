pub use models::{UpdateProfile, UserProfile};
pub use service::UserService;

pub mod models;
pub mod service;
