use axum::{
    extract::State,
    http::{
        header::{HeaderName, AUTHORIZATION, CONTENT_TYPE},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Mock admin backend
// ============================================================================

pub const VALID_EMAIL: &str = "admin@infinity.io";
pub const VALID_PASSWORD: &str = "correct-password";

/// Programmable stand-in for the admin API, served on an ephemeral port
#[derive(Clone)]
pub struct MockBackend {
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

#[derive(Default)]
struct MockState {
    valid_tokens: Mutex<HashSet<String>>,
    valid_refresh_tokens: Mutex<HashSet<String>>,
    requests: Mutex<Vec<RecordedRequest>>,
    login_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    token_counter: AtomicU64,
    refresh_fails: AtomicBool,
    refresh_delay_ms: AtomicU64,
    rotate_refresh_token: AtomicBool,
    logout_fails: AtomicBool,
    login_omits_token: AtomicBool,
    slow_completed: AtomicBool,
    slow_cancelled: AtomicBool,
    profile_name: Mutex<String>,
}

/// A request as seen by the backend
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub authorization_count: usize,
    pub content_type: Option<String>,
    pub request_id: Option<String>,
    pub body: Option<Value>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(MockState {
            profile_name: Mutex::new("Ada Admin".to_string()),
            ..MockState::default()
        });

        let app = Router::new()
            .route("/api/v1/user/login", post(login))
            .route("/api/v1/user/refresh", post(refresh))
            .route("/api/v1/user/logout", post(logout))
            .route("/api/v1/user/me", post(get_profile).put(update_profile))
            .route("/api/v1/orders", get(orders))
            .route("/api/v1/slow", get(slow))
            .route("/api/v1/text", get(text))
            .route("/api/v1/echo", get(echo).post(echo_with_body))
            .route("/api/v1/error/json", get(json_error))
            .route("/api/v1/error/empty", get(empty_error))
            .route("/api/v1/error/broken-json", get(broken_json))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Issue an access/refresh pair the backend will accept
    pub fn issue_session(&self) -> (String, String) {
        let access = self.mint_access_token();
        let refresh = format!("refresh-{}", uuid::Uuid::new_v4());
        self.state
            .valid_refresh_tokens
            .lock()
            .unwrap()
            .insert(refresh.clone());
        (access, refresh)
    }

    fn mint_access_token(&self) -> String {
        mint_access_token(&self.state)
    }

    /// Make the backend reject a previously valid access token
    pub fn expire_access_token(&self, token: &str) {
        self.state.valid_tokens.lock().unwrap().remove(token);
    }

    pub fn is_valid_access_token(&self, token: &str) -> bool {
        self.state.valid_tokens.lock().unwrap().contains(token)
    }

    pub fn fail_refresh(&self) {
        self.state.refresh_fails.store(true, Ordering::SeqCst);
    }

    pub fn delay_refresh(&self, delay: Duration) {
        self.state
            .refresh_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn rotate_refresh_tokens(&self) {
        self.state.rotate_refresh_token.store(true, Ordering::SeqCst);
    }

    pub fn fail_logout(&self) {
        self.state.logout_fails.store(true, Ordering::SeqCst);
    }

    pub fn omit_login_token(&self) {
        self.state.login_omits_token.store(true, Ordering::SeqCst);
    }

    /// True once a `/slow` handler ran to the end and produced its response
    pub fn slow_completed(&self) -> bool {
        self.state.slow_completed.load(Ordering::SeqCst)
    }

    /// True once a `/slow` handler was dropped before finishing
    pub fn slow_cancelled(&self) -> bool {
        self.state.slow_cancelled.load(Ordering::SeqCst)
    }

    pub fn login_calls(&self) -> usize {
        self.state.login_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.state.logout_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }

    /// Requests recorded for a path, in arrival order
    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.state
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }
}

fn mint_access_token(state: &MockState) -> String {
    let n = state.token_counter.fetch_add(1, Ordering::SeqCst);
    let token = format!("access-{}-{}", n, uuid::Uuid::new_v4());
    state.valid_tokens.lock().unwrap().insert(token.clone());
    token
}

fn record(state: &MockState, method: &str, path: &str, headers: &HeaderMap, body: Option<Value>) {
    let header = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.to_string(),
        path: path.to_string(),
        authorization: header(AUTHORIZATION),
        authorization_count: headers.get_all(AUTHORIZATION).iter().count(),
        content_type: header(CONTENT_TYPE),
        request_id: header(HeaderName::from_static("x-request-id")),
        body,
    });
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn authorized(state: &MockState, headers: &HeaderMap) -> bool {
    bearer(headers)
        .map(|t| state.valid_tokens.lock().unwrap().contains(&t))
        .unwrap_or(false)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"message": "Token expired"})),
    )
        .into_response()
}

fn profile_json(state: &MockState) -> Value {
    json!({
        "role_id": 1,
        "user_id": "u-1",
        "name": state.profile_name.lock().unwrap().clone(),
        "email": VALID_EMAIL,
        "status": "active"
    })
}

// ============================================================================
// Handlers
// ============================================================================

async fn login(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    record(&state, "POST", "/api/v1/user/login", &headers, Some(body.clone()));
    state.login_calls.fetch_add(1, Ordering::SeqCst);

    let email = body.get("email").and_then(Value::as_str).unwrap_or_default();
    let password = body.get("password").and_then(Value::as_str).unwrap_or_default();
    if email != VALID_EMAIL || password != VALID_PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "Invalid email or password"})),
        )
            .into_response();
    }

    if state.login_omits_token.load(Ordering::SeqCst) {
        return Json(json!({"data": {"user_id": "u-1", "email": email}})).into_response();
    }

    let access = mint_access_token(&state);
    let refresh = format!("refresh-{}", uuid::Uuid::new_v4());
    state
        .valid_refresh_tokens
        .lock()
        .unwrap()
        .insert(refresh.clone());

    Json(json!({
        "data": {
            "token": access,
            "refresh_token": refresh,
            "user_id": "u-1",
            "email": email,
            "name": "Ada Admin",
            "role": "admin"
        }
    }))
    .into_response()
}

async fn refresh(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    record(&state, "POST", "/api/v1/user/refresh", &headers, Some(body.clone()));
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let delay = state.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let presented = body
        .get("refresh_token")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let known = state
        .valid_refresh_tokens
        .lock()
        .unwrap()
        .contains(&presented);

    if state.refresh_fails.load(Ordering::SeqCst) || !known {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Refresh token rejected"})),
        )
            .into_response();
    }

    let access = mint_access_token(&state);
    if state.rotate_refresh_token.load(Ordering::SeqCst) {
        let rotated = format!("refresh-{}", uuid::Uuid::new_v4());
        {
            let mut tokens = state.valid_refresh_tokens.lock().unwrap();
            tokens.remove(&presented);
            tokens.insert(rotated.clone());
        }
        return Json(json!({"accessToken": access, "refreshToken": rotated})).into_response();
    }

    Json(json!({"data": {"token": access}})).into_response()
}

async fn logout(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    record(&state, "POST", "/api/v1/user/logout", &headers, None);
    state.logout_calls.fetch_add(1, Ordering::SeqCst);

    if state.logout_fails.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"message": "Logout unavailable"})),
        )
            .into_response();
    }
    if let Some(token) = bearer(&headers) {
        state.valid_tokens.lock().unwrap().remove(&token);
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn get_profile(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Response {
    record(
        &state,
        "POST",
        "/api/v1/user/me",
        &headers,
        body.map(|Json(b)| b),
    );
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    Json(json!({"data": profile_json(&state)})).into_response()
}

async fn update_profile(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    record(&state, "PUT", "/api/v1/user/me", &headers, Some(body.clone()));
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    if let Some(name) = body.get("name").and_then(Value::as_str) {
        *state.profile_name.lock().unwrap() = name.to_string();
    }
    Json(json!({"data": profile_json(&state)})).into_response()
}

async fn orders(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    record(&state, "GET", "/api/v1/orders", &headers, None);
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    Json(json!([{"id": 1, "total": 120.5}, {"id": 2, "total": 80.0}])).into_response()
}

/// Marks the slow handler cancelled unless it was disarmed on completion
struct CancelGuard {
    state: Arc<MockState>,
    armed: bool,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed {
            self.state.slow_cancelled.store(true, Ordering::SeqCst);
        }
    }
}

async fn slow(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    record(&state, "GET", "/api/v1/slow", &headers, None);
    let mut guard = CancelGuard {
        state: state.clone(),
        armed: true,
    };
    tokio::time::sleep(Duration::from_secs(5)).await;
    guard.armed = false;
    state.slow_completed.store(true, Ordering::SeqCst);
    Json(json!({"late": true})).into_response()
}

async fn text(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    record(&state, "GET", "/api/v1/text", &headers, None);
    "pong".into_response()
}

async fn echo(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    record(&state, "GET", "/api/v1/echo", &headers, None);
    Json(json!({"ok": true})).into_response()
}

async fn echo_with_body(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    record(&state, "POST", "/api/v1/echo", &headers, Some(body.clone()));
    Json(json!({"received": body})).into_response()
}

async fn json_error(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    record(&state, "GET", "/api/v1/error/json", &headers, None);
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({"error": "Quantity must be positive"})),
    )
        .into_response()
}

async fn empty_error(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    record(&state, "GET", "/api/v1/error/empty", &headers, None);
    StatusCode::SERVICE_UNAVAILABLE.into_response()
}

async fn broken_json(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    record(&state, "GET", "/api/v1/error/broken-json", &headers, None);
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "application/json")],
        "{\"unterminated\": ",
    )
        .into_response()
}
