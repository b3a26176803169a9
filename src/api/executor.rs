use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::error::ApiError;
use super::types::{ApiRequest, ResponseBody};
use crate::config::ApiConfig;
use crate::session::store::TokenStore;

/// Which bearer credential a request carries
#[derive(Debug, Clone, Copy)]
enum Bearer<'a> {
    Stored,
    Explicit(&'a str),
    Omit,
}

/// Issues single HTTP calls against the configured backend.
///
/// One attempt per call: no retries happen here.
pub struct HttpExecutor {
    config: ApiConfig,
    client: reqwest::Client,
    store: Arc<dyn TokenStore>,
}

impl HttpExecutor {
    pub fn new(config: ApiConfig, store: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ApiError::Network {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            config,
            client,
            store,
        })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Execute a request, authenticating with `explicit_token` when given and
    /// otherwise with the stored access token (if any).
    pub async fn execute(
        &self,
        request: &ApiRequest,
        explicit_token: Option<&str>,
    ) -> Result<ResponseBody, ApiError> {
        let bearer = match explicit_token {
            Some(token) => Bearer::Explicit(token),
            None => Bearer::Stored,
        };
        self.send(request, bearer).await
    }

    /// Execute a request without any Authorization header
    pub async fn execute_anonymous(&self, request: &ApiRequest) -> Result<ResponseBody, ApiError> {
        self.send(request, Bearer::Omit).await
    }

    /// Current stored access token; unreadable storage counts as none
    pub async fn stored_token(&self) -> Option<String> {
        match self.store.access_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Could not read access token, sending request without it");
                None
            }
        }
    }

    #[instrument(
        skip(self, request, bearer),
        fields(method = request.method.as_str(), endpoint = %request.endpoint)
    )]
    async fn send(&self, request: &ApiRequest, bearer: Bearer<'_>) -> Result<ResponseBody, ApiError> {
        let url = self.config.url_for(&request.endpoint);

        let token = match bearer {
            Bearer::Explicit(token) => Some(token.to_string()),
            Bearer::Stored => self.stored_token().await,
            Bearer::Omit => None,
        };

        let mut builder = self.client.request(request.method.into(), &url);
        if let Some(token) = &token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        for (name, value) in &request.headers {
            // An attached bearer takes precedence over a caller-set Authorization
            if token.is_some() && name.eq_ignore_ascii_case(AUTHORIZATION.as_str()) {
                debug!("Dropping caller Authorization header in favour of bearer token");
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }

        debug!(%url, authenticated = token.is_some(), "API request");

        let exchange = async {
            let response = builder
                .send()
                .await
                .map_err(|e| self.transport_error(e))?;
            read_response(response).await.map_err(|e| match e {
                ReadError::Transport(e) => self.transport_error(e),
                ReadError::Api(e) => e,
            })
        };

        // Dropping the exchange on expiry aborts the underlying connection
        match tokio::time::timeout(self.config.timeout, exchange).await {
            Ok(Ok(body)) => Ok(body),
            Ok(Err(e)) => {
                debug!(status = e.status(), error = %e, "API request failed");
                Err(e)
            }
            Err(_) => {
                warn!(
                    %url,
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "API request timed out"
                );
                Err(ApiError::Timeout)
            }
        }
    }

    fn transport_error(&self, error: reqwest::Error) -> ApiError {
        if error.is_timeout() {
            ApiError::Timeout
        } else if error.is_connect() {
            warn!(base_url = %self.config.base_url, error = %error, "API server unreachable");
            ApiError::Unreachable {
                base_url: self.config.base_url.clone(),
                message: error.to_string(),
            }
        } else {
            warn!(error = %error, "Network error");
            ApiError::Network {
                message: error.to_string(),
            }
        }
    }
}

enum ReadError {
    Transport(reqwest::Error),
    Api(ApiError),
}

async fn read_response(response: reqwest::Response) -> Result<ResponseBody, ReadError> {
    let status = response.status();
    let declares_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json"))
        .unwrap_or(false);

    let text = response.text().await.map_err(ReadError::Transport)?;

    debug!(status = status.as_u16(), json = declares_json, "API response");

    let body = if declares_json {
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => ResponseBody::Json(value),
            Err(e) if status.is_success() => {
                return Err(ReadError::Api(ApiError::Decode {
                    message: format!("invalid JSON body: {}", e),
                }))
            }
            // Keep the raw text so the error still carries something useful
            Err(_) => ResponseBody::Text(text),
        }
    } else {
        ResponseBody::Text(text)
    };

    if status.is_success() {
        return Ok(body);
    }

    let body_value = match body {
        ResponseBody::Json(value) => Some(value),
        ResponseBody::Text(text) if text.is_empty() => None,
        ResponseBody::Text(text) => Some(Value::String(text)),
    };

    Err(ReadError::Api(ApiError::from_response(
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown"),
        body_value,
    )))
}
