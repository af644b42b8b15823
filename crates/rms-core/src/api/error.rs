use serde::Deserialize;
use thiserror::Error;

/// Marker reported for synthesized session-expired failures.
/// Not an HTTP status code, so callers can tell it apart from a real 401.
pub const SESSION_EXPIRED_MARKER: &str = "CUSTOM_ERROR";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request failed with status {status}: {}", ApiError::truncate_body(.body))]
    Http { status: u16, body: String },

    #[error("Session expired")]
    SessionExpired,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Session storage error: {0}")]
    Storage(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// FastAPI-style error payload: `{"detail": "..."}`
#[derive(Debug, Deserialize)]
struct ErrorDetail {
    detail: serde_json::Value,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        ApiError::Http {
            status: status.as_u16(),
            body: body.to_string(),
        }
    }

    /// Wrap a storage backend failure, keeping the full context chain.
    pub fn storage(err: anyhow::Error) -> Self {
        ApiError::Storage(format!("{:#}", err))
    }

    /// HTTP status of an application failure, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired)
    }

    /// Status marker the UI layer switches on: the numeric HTTP code for
    /// application failures, `CUSTOM_ERROR` for an expired session.
    pub fn status_marker(&self) -> Option<String> {
        match self {
            ApiError::SessionExpired => Some(SESSION_EXPIRED_MARKER.to_string()),
            other => other.status().map(|s| s.to_string()),
        }
    }

    /// Human-readable message for display, preferring the backend's `detail`.
    pub fn detail(&self) -> String {
        match self {
            ApiError::Http { body, .. } => {
                match serde_json::from_str::<ErrorDetail>(body) {
                    Ok(ErrorDetail { detail: serde_json::Value::String(s) }) => s,
                    Ok(ErrorDetail { detail }) => detail.to_string(),
                    Err(_) => "An error occurred".to_string(),
                }
            }
            other => other.to_string(),
        }
    }
}
