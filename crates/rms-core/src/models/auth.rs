//! Request and response bodies for the `/auth` endpoints.

use serde::{Deserialize, Serialize};

use super::user::User;
use crate::api::ApiError;

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(rename = "confirmPassword")]
    pub confirm_password: String,
    #[serde(rename = "fullName")]
    pub full_name: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        validate_email(&self.email)?;
        if self.password.is_empty() {
            return Err(ApiError::Validation("Password is required".to_string()));
        }
        if self.password != self.confirm_password {
            return Err(ApiError::Validation("Passwords do not match".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangePasswordRequest {
    pub email: String,
    pub old_password: String,
    pub new_password: String,
}

/// Change-password form as entered by the user, before the email is known.
#[derive(Debug, Clone)]
pub struct ChangePasswordForm {
    pub old_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

impl ChangePasswordForm {
    /// Check the form and attach the signed-in user's email
    pub fn into_request(self, email: &str) -> Result<ChangePasswordRequest, ApiError> {
        if self.new_password != self.confirm_password {
            return Err(ApiError::Validation("Passwords do not match".to_string()));
        }
        if email.is_empty() {
            return Err(ApiError::Validation(
                "User email not found. Please login again.".to_string(),
            ));
        }
        Ok(ChangePasswordRequest {
            email: email.to_string(),
            old_password: self.old_password,
            new_password: self.new_password,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateUserRoleRequest {
    pub user_id: i64,
    pub role: String,
    pub is_superuser: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateUserRoleResponse {
    pub message: String,
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    let trimmed = email.trim();
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ApiError::Validation(format!("Invalid email address: {}", trimmed))),
    }
}
