//! API client for the RMS `/auth` endpoints.
//!
//! `RmsClient` is a thin typed layer over [`AuthPipeline`]: each method builds
//! a [`RequestDescriptor`], runs it through the pipeline and decodes the JSON
//! response.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::auth::{Session, SessionStorage};
use crate::config::Config;
use crate::models::{
    ChangePasswordRequest, LoginRequest, LoginResponse, MessageResponse, RegisterRequest,
    UpdateUserRoleRequest, UpdateUserRoleResponse, User,
};

use super::pipeline::{ApiResponse, AuthPipeline, RequestDescriptor};
use super::ApiError;

/// API client for the RMS backend.
/// Clone is cheap - the pipeline shares its connection pool and storage.
#[derive(Clone)]
pub struct RmsClient {
    pipeline: AuthPipeline,
}

impl RmsClient {
    pub fn new(pipeline: AuthPipeline) -> Self {
        Self { pipeline }
    }

    /// Create a client from configuration and a storage backend
    pub fn from_config(config: &Config, storage: Arc<dyn SessionStorage>) -> Result<Self, ApiError> {
        let pipeline = AuthPipeline::with_timeout(
            &config.api_base_url(),
            storage,
            Duration::from_secs(config.request_timeout_secs()),
        )?;
        Ok(Self::new(pipeline))
    }

    /// Set the callback fired when the session can no longer be refreshed
    pub fn on_session_expired(self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            pipeline: self.pipeline.on_session_expired(callback),
        }
    }

    pub fn pipeline(&self) -> &AuthPipeline {
        &self.pipeline
    }

    /// Load the current session from storage, if any
    pub fn session(&self) -> Result<Option<Session>, ApiError> {
        Session::load(self.pipeline.storage()).map_err(ApiError::storage)
    }

    async fn call<T: DeserializeOwned>(&self, request: RequestDescriptor) -> Result<T, ApiError> {
        self.pipeline.execute(&request).await?.json()
    }

    // ===== Authentication =====

    /// Log in and persist the returned tokens as the active session.
    /// A 401 here means bad credentials, not an expired session.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let request = RequestDescriptor::post("/auth/login").json(&LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        })?;

        let response: LoginResponse = self.pipeline.execute_public(&request).await?.json()?;

        Session::new(response.access_token.clone(), response.refresh_token.clone())
            .store(self.pipeline.storage())
            .map_err(ApiError::storage)?;
        info!(email = %email.trim(), "Logged in");

        Ok(response)
    }

    /// Register a new account. Does not log in.
    pub async fn register(&self, request: &RegisterRequest) -> Result<(), ApiError> {
        request.validate()?;
        let request = RequestDescriptor::post("/auth/register").json(request)?;
        self.pipeline.execute_public(&request).await?;
        info!("Registered new account");
        Ok(())
    }

    /// Log out on the server, then wipe the local session.
    /// If the server call fails the local session is kept.
    pub async fn logout(&self) -> Result<MessageResponse, ApiError> {
        let response: ApiResponse = match self
            .pipeline
            .execute(&RequestDescriptor::post("/auth/logout"))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Logout failed");
                return Err(e);
            }
        };

        let message = response.json::<MessageResponse>().unwrap_or_else(|_| MessageResponse {
            message: "Logged out".to_string(),
        });

        self.pipeline.end_session()?;
        info!("Logged out, session cleared");

        Ok(message)
    }

    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.call(RequestDescriptor::get("/auth/me")).await
    }

    pub async fn change_password(
        &self,
        request: &ChangePasswordRequest,
    ) -> Result<MessageResponse, ApiError> {
        self.call(RequestDescriptor::post("/auth/change_password").json(request)?)
            .await
    }

    // ===== User administration =====

    pub async fn users(&self) -> Result<Vec<User>, ApiError> {
        let users: Vec<User> = self.call(RequestDescriptor::get("/auth/users")).await?;
        debug!(count = users.len(), "Fetched users");
        Ok(users)
    }

    pub async fn update_user_role(
        &self,
        request: &UpdateUserRoleRequest,
    ) -> Result<UpdateUserRoleResponse, ApiError> {
        let path = format!("/auth/users/{}/role", request.user_id);
        let descriptor = RequestDescriptor::patch(path)
            .param("role", &request.role)
            .param("is_superuser", request.is_superuser.unwrap_or(false));
        self.call(descriptor).await
    }

    pub async fn delete_user(&self, user_id: i64) -> Result<MessageResponse, ApiError> {
        self.call(RequestDescriptor::delete(format!("/auth/users/{}", user_id)))
            .await
    }
}
