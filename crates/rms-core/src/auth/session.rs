use anyhow::Result;

use super::storage::{SessionStorage, StorageKey};

/// Tokens that make up an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl Session {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }

    /// Load the session from storage. An access token is required;
    /// the refresh token is optional.
    pub fn load(storage: &dyn SessionStorage) -> Result<Option<Self>> {
        let Some(access_token) = storage.get(StorageKey::AccessToken)? else {
            return Ok(None);
        };
        let refresh_token = storage.get(StorageKey::RefreshToken)?;
        Ok(Some(Self {
            access_token,
            refresh_token,
        }))
    }

    /// Save the session to storage, replacing any previous tokens
    pub fn store(&self, storage: &dyn SessionStorage) -> Result<()> {
        storage.set(StorageKey::AccessToken, &self.access_token)?;
        match self.refresh_token {
            Some(ref refresh) => storage.set(StorageKey::RefreshToken, refresh)?,
            None => storage.remove(StorageKey::RefreshToken)?,
        }
        Ok(())
    }

    /// Destroy the session. Clears every key, like a browser storage wipe.
    pub fn clear(storage: &dyn SessionStorage) -> Result<()> {
        storage.clear()
    }

    pub fn is_authenticated(storage: &dyn SessionStorage) -> Result<bool> {
        Ok(storage.get(StorageKey::AccessToken)?.is_some())
    }
}
