//! Authenticated requests with transparent access-token renewal.
//!
//! A request rejected with 401 joins the single in-flight refresh (starting
//! it when none is running) and is replayed once with the token it produced.
//! The refresh runs as its own task and every waiter awaits the same shared
//! handle, so one network call resolves them all and cancelled callers do not
//! stall it.

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::error::ApiError;
use super::executor::HttpExecutor;
use super::types::{ApiRequest, Method, ResponseBody};
use crate::session::events::{SessionEvent, SessionEvents};
use crate::session::models::RefreshedTokens;
use crate::session::store::TokenStore;

pub const REFRESH_PATH: &str = "/user/refresh";

/// Result of one refresh, handed to every waiter
#[derive(Debug, Clone)]
enum RefreshOutcome {
    Renewed(String),
    /// The session was cleared or replaced mid-exchange; tokens were dropped
    Discarded,
    Failed(ApiError),
}

type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Wraps the executor with single-flight 401 handling
pub struct RefreshCoordinator {
    executor: Arc<HttpExecutor>,
    store: Arc<dyn TokenStore>,
    events: SessionEvents,
    refresh_endpoint: String,
    // Some while a refresh is outstanding
    in_flight: Arc<Mutex<Option<SharedRefresh>>>,
}

/// What a rejected request should do next
enum Recovery {
    /// Another refresh already replaced the rejected token
    Replay(String),
    Await(SharedRefresh),
    /// Nothing to refresh with; the session is gone
    Expired,
}

impl RefreshCoordinator {
    pub fn new(
        executor: Arc<HttpExecutor>,
        store: Arc<dyn TokenStore>,
        events: SessionEvents,
    ) -> Self {
        let refresh_endpoint = executor.config().endpoint(REFRESH_PATH);
        Self {
            executor,
            store,
            events,
            refresh_endpoint,
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    pub fn executor(&self) -> &Arc<HttpExecutor> {
        &self.executor
    }

    /// True while a refresh call is outstanding
    pub async fn is_refreshing(&self) -> bool {
        self.in_flight.lock().await.is_some()
    }

    /// Execute `request`, renewing credentials on 401.
    ///
    /// Non-401 outcomes pass through untouched. A 401 that cannot be resolved
    /// surfaces as `ApiError::AuthExpired` wrapping the original rejection.
    #[instrument(
        skip(self, request),
        fields(method = request.method.as_str(), endpoint = %request.endpoint)
    )]
    pub async fn request_with_refresh(&self, request: ApiRequest) -> Result<ResponseBody, ApiError> {
        let sent_with = self.executor.stored_token().await;

        let rejection = match self.executor.execute(&request, sent_with.as_deref()).await {
            Err(e) if e.is_unauthorized() => e,
            other => return other,
        };

        debug!("Request rejected as unauthorized");

        match self.recover(sent_with.as_deref()).await {
            Recovery::Replay(token) => {
                debug!("Token already renewed, replaying request");
                self.executor.execute(&request, Some(&token)).await
            }
            Recovery::Await(refresh) => match refresh.await {
                RefreshOutcome::Renewed(token) => {
                    debug!("Refresh succeeded, replaying request");
                    self.executor.execute(&request, Some(&token)).await
                }
                RefreshOutcome::Discarded => {
                    debug!("Session ended during refresh, request not replayed");
                    Err(ApiError::AuthExpired {
                        source: Box::new(rejection),
                    })
                }
                RefreshOutcome::Failed(refresh_error) => {
                    debug!(error = %refresh_error, "Refresh failed, request not replayed");
                    Err(ApiError::AuthExpired {
                        source: Box::new(rejection),
                    })
                }
            },
            Recovery::Expired => Err(ApiError::AuthExpired {
                source: Box::new(rejection),
            }),
        }
    }

    /// Decide how a request rejected while carrying `rejected` proceeds.
    ///
    /// The slot lock is held for the whole decision so two rejections can
    /// never both start a refresh.
    async fn recover(&self, rejected: Option<&str>) -> Recovery {
        let mut slot = self.in_flight.lock().await;

        if let Some(refresh) = slot.as_ref() {
            debug!("Refresh already in flight, waiting on it");
            return Recovery::Await(refresh.clone());
        }

        if let Some(current) = self.executor.stored_token().await {
            if Some(current.as_str()) != rejected {
                return Recovery::Replay(current);
            }
        }

        let refresh_token = match self.store.refresh_token().await {
            Ok(Some(token)) => token,
            Ok(None) => {
                info!("No refresh token stored, ending session");
                drop(slot);
                end_session(self.store.as_ref(), &self.events).await;
                return Recovery::Expired;
            }
            Err(e) => {
                warn!(error = %e, "Could not read refresh token, ending session");
                drop(slot);
                end_session(self.store.as_ref(), &self.events).await;
                return Recovery::Expired;
            }
        };

        info!("Starting token refresh");
        let refresh = self.start_refresh(refresh_token);
        *slot = Some(refresh.clone());
        Recovery::Await(refresh)
    }

    fn start_refresh(&self, refresh_token: String) -> SharedRefresh {
        let executor = self.executor.clone();
        let store = self.store.clone();
        let events = self.events.clone();
        let endpoint = self.refresh_endpoint.clone();
        let slot = self.in_flight.clone();

        let task = tokio::spawn(async move {
            let outcome =
                match exchange_refresh_token(&executor, store.as_ref(), &endpoint, &refresh_token)
                    .await
                {
                    Ok(Some(token)) => {
                        info!("Token refresh succeeded");
                        events.emit(SessionEvent::TokenRefreshed);
                        RefreshOutcome::Renewed(token)
                    }
                    Ok(None) => {
                        // Whoever ended or replaced the session already
                        // announced it, so the store is left alone
                        info!("Session changed during refresh, discarding renewed tokens");
                        RefreshOutcome::Discarded
                    }
                    Err(e) => {
                        let current = store.refresh_token().await.ok().flatten();
                        if current.as_deref() == Some(refresh_token.as_str()) {
                            warn!(error = %e, "Token refresh failed, ending session");
                            end_session(store.as_ref(), &events).await;
                        } else {
                            info!(error = %e, "Token refresh failed for a session that already changed");
                        }
                        RefreshOutcome::Failed(e)
                    }
                };

            *slot.lock().await = None;
            outcome
        });

        async move {
            task.await.unwrap_or_else(|e| {
                warn!(error = %e, "Token refresh task did not complete");
                RefreshOutcome::Failed(ApiError::Network {
                    message: format!("refresh task aborted: {}", e),
                })
            })
        }
        .boxed()
        .shared()
    }

    /// GET deserializing the JSON body into `T`
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.request_with_refresh(ApiRequest::get(endpoint))
            .await?
            .into_json()
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_json(Method::Post, endpoint, body).await
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_json(Method::Put, endpoint, body).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.request_with_refresh(ApiRequest::delete(endpoint))
            .await?
            .into_json()
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body).map_err(|e| ApiError::Decode {
            message: format!("could not encode request body: {}", e),
        })?;
        self.request_with_refresh(ApiRequest::new(method, endpoint).with_body(body))
            .await?
            .into_json()
    }
}

/// Trade the refresh token for a new access token and persist it.
///
/// `Ok(None)` when the stored session no longer holds `refresh_token`.
async fn exchange_refresh_token(
    executor: &HttpExecutor,
    store: &dyn TokenStore,
    endpoint: &str,
    refresh_token: &str,
) -> Result<Option<String>, ApiError> {
    let request = ApiRequest::post(endpoint, json!({ "refresh_token": refresh_token }));
    let body = executor.execute_anonymous(&request).await?;

    let tokens = body
        .unwrap_data()
        .and_then(RefreshedTokens::from_payload)
        .ok_or_else(|| ApiError::Decode {
            message: "refresh response carried no access token".to_string(),
        })?;

    match store
        .save_tokens(refresh_token, &tokens.access_token, tokens.refresh_token.as_deref())
        .await
    {
        Ok(true) => {}
        Ok(false) => return Ok(None),
        // The replay uses the returned token directly, so a failed write only
        // costs the next request another refresh
        Err(e) => warn!(error = %e, "Could not persist refreshed tokens"),
    }

    Ok(Some(tokens.access_token))
}

async fn end_session(store: &dyn TokenStore, events: &SessionEvents) {
    if let Err(e) = store.clear().await {
        warn!(error = %e, "Failed to clear stored session");
    }
    events.emit(SessionEvent::Expired);
}
