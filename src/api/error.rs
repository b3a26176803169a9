use serde_json::Value;
use thiserror::Error;

/// Failure of a call against the admin API
///
/// Cloneable so a single refresh outcome can be handed to every waiter.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    /// Non-2xx response
    #[error("{message}")]
    Http {
        status: u16,
        message: String,
        body: Option<Value>,
    },

    /// Transport failure before any response arrived
    #[error("Network error: {message}")]
    Network { message: String },

    /// The configured host refused or could not be resolved
    #[error(
        "Cannot connect to API server at {base_url}. Please check:\n\
         1. Is the API server running at {base_url}?\n\
         2. Check network and proxy settings\n\
         3. Underlying error: {message}"
    )]
    Unreachable { base_url: String, message: String },

    #[error("Request timeout - server did not respond in time")]
    Timeout,

    /// A 401 the refresh coordinator could not resolve
    #[error("Session expired: {source}")]
    AuthExpired { source: Box<ApiError> },

    /// A success response whose body did not have the expected shape
    #[error("Unexpected response body: {message}")]
    Decode { message: String },
}

impl ApiError {
    pub const UNAUTHORIZED: u16 = 401;
    pub const TIMEOUT: u16 = 408;

    /// Numeric status; 0 for failures that never produced a response
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Http { status, .. } => *status,
            ApiError::Network { .. } | ApiError::Unreachable { .. } | ApiError::Decode { .. } => 0,
            ApiError::Timeout => Self::TIMEOUT,
            ApiError::AuthExpired { .. } => Self::UNAUTHORIZED,
        }
    }

    /// True for a raw 401 from the backend that refresh may resolve
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Http { status, .. } if *status == Self::UNAUTHORIZED)
    }

    /// Build an `Http` error from a status line and parsed body.
    ///
    /// The message comes from the body's `message` or `error` string field,
    /// falling back to `HTTP <status>: <reason>`.
    pub fn from_response(status: u16, reason: &str, body: Option<Value>) -> Self {
        let from_body = body.as_ref().and_then(|b| {
            ["message", "error"]
                .iter()
                .find_map(|key| b.get(key).and_then(Value::as_str))
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });

        ApiError::Http {
            status,
            message: from_body.unwrap_or_else(|| format!("HTTP {}: {}", status, reason)),
            body,
        }
    }
}
