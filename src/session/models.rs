use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Access + refresh credentials issued by the backend
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }
}

// Tokens never show up in logs
impl std::fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Identity cached next to the credentials after login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: Option<String>,
}

/// Outcome of a successful login
#[derive(Debug, Clone, PartialEq)]
pub struct LoginOutcome {
    pub user: SessionUser,
    pub credentials: CredentialPair,
}

impl LoginOutcome {
    /// Map a login response payload (already unwrapped from `data`).
    ///
    /// Returns `None` when no access token is present.
    pub fn from_payload(payload: &Value, submitted_email: &str) -> Option<Self> {
        let access_token = first_string(payload, &["token", "accessToken", "access_token"])?;
        let refresh_token = first_string(payload, &["refresh_token", "refreshToken"]);

        let user = SessionUser {
            id: first_id(payload, &["user_id", "userId", "id"]).unwrap_or_default(),
            email: first_string(payload, &["email"]).unwrap_or_else(|| submitted_email.to_string()),
            name: first_string(payload, &["name", "fullName"]),
            role: first_string(payload, &["role", "userRole"]),
        };

        Some(Self {
            user,
            credentials: CredentialPair::new(access_token, refresh_token),
        })
    }
}

/// Tokens returned by the refresh endpoint
#[derive(Clone, PartialEq)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl RefreshedTokens {
    pub fn from_payload(payload: &Value) -> Option<Self> {
        Some(Self {
            access_token: first_string(payload, &["token", "accessToken", "access_token"])?,
            refresh_token: first_string(payload, &["refresh_token", "refreshToken"]),
        })
    }
}

fn first_string(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| payload.get(key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

// Backends disagree on whether ids are strings or numbers
fn first_id(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match payload.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
