// Public API - what other modules can use
pub use error::ApiError;
pub use executor::HttpExecutor;
pub use refresh::RefreshCoordinator;
pub use types::{ApiRequest, DataEnvelope, Method, ResponseBody};

pub mod error;
pub mod executor;
pub mod refresh;
pub mod types;
