//! Data models for the RMS API.
//!
//! - `User`, `Role`: accounts and their access level
//! - Auth request/response bodies: login, register, change password,
//!   role updates, token refresh

pub mod auth;
pub mod user;

pub use auth::{
    ChangePasswordForm, ChangePasswordRequest, LoginRequest, LoginResponse, MessageResponse,
    RefreshRequest, RefreshResponse, RegisterRequest, UpdateUserRoleRequest,
    UpdateUserRoleResponse,
};
pub use user::{Role, User};
