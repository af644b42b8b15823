//! Authentication module for managing the client session.
//!
//! This module provides:
//! - `SessionStorage`: injected key/value storage for tokens (memory, file, keyring)
//! - `Session`: the access/refresh token pair
//! - `RouteGuard`: role-gated access decisions for the admin screens

pub mod access;
pub mod session;
pub mod storage;

pub use access::{landing_redirect, Access, AuthState, RouteGuard};
pub use session::Session;
pub use storage::{FileStorage, KeyringStorage, MemoryStorage, SessionStorage, StorageKey};
