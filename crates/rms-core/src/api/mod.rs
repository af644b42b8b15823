//! REST API client module for the RMS backend.
//!
//! This module provides the `AuthPipeline`, which attaches bearer tokens and
//! transparently refreshes an expired access token once per request, and the
//! typed `RmsClient` built on top of it.

pub mod client;
pub mod error;
pub mod pipeline;

pub use client::RmsClient;
pub use error::{ApiError, SESSION_EXPIRED_MARKER};
pub use pipeline::{ApiResponse, AuthPipeline, RequestDescriptor, SessionTerminator};
