//! Client configuration loaded from the environment.
//!
//! A `.env` file in the working directory is honored. Every value has a
//! default so an unconfigured client talks to a local backend.

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8089";
pub const DEFAULT_API_VERSION: &str = "/api/v1";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid environment value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

/// Connection settings for the admin API
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Scheme + host (+ port) of the backend, without a trailing slash
    pub base_url: String,

    /// Path prefix prepended to every versioned endpoint
    pub api_version: String,

    /// Upper bound on a single request, send through body read
    pub timeout: Duration,

    /// When set, credentials persist to this JSON file
    pub token_file: Option<PathBuf>,
}

impl ApiConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Missing .env is fine
        let _ = dotenvy::dotenv();

        let base_url = env::var("INFINITY_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let api_version = env::var("INFINITY_API_VERSION")
            .unwrap_or_else(|_| DEFAULT_API_VERSION.to_string());

        let timeout = match env::var("INFINITY_API_TIMEOUT_MS") {
            Ok(raw) => parse_timeout_ms(&raw)?,
            Err(_) => Duration::from_millis(DEFAULT_TIMEOUT_MS),
        };

        let token_file = env::var("INFINITY_TOKEN_FILE")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self::default()
            .with_base_url(base_url)
            .with_api_version(api_version)
            .with_timeout(timeout)
            .with_token_file(token_file))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        let version = api_version.into();
        let trimmed = version.trim_end_matches('/');
        self.api_version = if trimmed.is_empty() || trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        };
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_token_file(mut self, token_file: Option<PathBuf>) -> Self {
        self.token_file = token_file;
        self
    }

    /// Versioned endpoint path, e.g. `endpoint("/user/me")` -> `/api/v1/user/me`
    pub fn endpoint(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.api_version, path)
        } else {
            format!("{}/{}", self.api_version, path)
        }
    }

    /// Absolute URL for an endpoint path that already carries any prefix
    pub fn url_for(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            token_file: None,
        }
    }
}

fn parse_timeout_ms(raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
        _ => Err(ConfigError::InvalidValue {
            name: "INFINITY_API_TIMEOUT_MS".to_string(),
            value: raw.to_string(),
        }),
    }
}
