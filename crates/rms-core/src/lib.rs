//! Core library for the RMS client.
//!
//! - [`api`]: the authenticated request pipeline and typed endpoint client
//! - [`auth`]: session storage, tokens and route guards
//! - [`models`]: wire types for the `/auth` endpoints
//! - [`admin`]: user-table rules for the admin screen
//! - [`config`]: persisted client configuration

pub mod admin;
pub mod api;
pub mod auth;
pub mod config;
pub mod models;

use std::sync::Arc;

use anyhow::Result;

pub use api::{ApiError, AuthPipeline, RequestDescriptor, RmsClient};
pub use auth::{Session, SessionStorage, StorageKey};
pub use config::{Config, StorageBackend};

/// Open the storage backend selected in `config`
pub fn open_storage(config: &Config) -> Result<Arc<dyn SessionStorage>> {
    let storage: Arc<dyn SessionStorage> = match config.storage {
        StorageBackend::File => Arc::new(auth::FileStorage::new(&config.cache_dir()?)),
        StorageBackend::Keyring => Arc::new(auth::KeyringStorage::new()),
    };
    Ok(storage)
}
