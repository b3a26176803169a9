use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::models::{UpdateProfile, UserProfile};
use crate::api::{DataEnvelope, RefreshCoordinator};
use crate::shared::AppError;

pub const PROFILE_PATH: &str = "/user/me";

/// Reads and edits the signed-in account's profile
pub struct UserService {
    client: Arc<RefreshCoordinator>,
    profile_endpoint: String,
}

impl UserService {
    pub fn new(client: Arc<RefreshCoordinator>) -> Self {
        let profile_endpoint = client.executor().config().endpoint(PROFILE_PATH);
        Self {
            client,
            profile_endpoint,
        }
    }

    #[instrument(skip(self))]
    pub async fn get_profile(&self) -> Result<UserProfile, AppError> {
        // The backend serves the profile on POST with an empty body
        let envelope: DataEnvelope<UserProfile> = self
            .client
            .post(&self.profile_endpoint, &json!({}))
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to fetch profile");
                e
            })?;

        Ok(envelope.data)
    }

    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: &UpdateProfile) -> Result<UserProfile, AppError> {
        if let Some(name) = &update.name {
            if name.trim().is_empty() {
                return Err(AppError::Validation("Name cannot be empty".to_string()));
            }
        }

        let envelope: DataEnvelope<UserProfile> = self
            .client
            .put(&self.profile_endpoint, update)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to update profile");
                e
            })?;

        info!(user_id = %envelope.data.user_id, "Profile updated");
        Ok(envelope.data)
    }
}
