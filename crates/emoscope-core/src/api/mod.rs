//! REST API client module for the emotion analysis service.
//!
//! This module provides the `ApiClient` for communicating with the
//! service's authentication and user management endpoints.
//!
//! The API uses bearer token authentication; tokens are issued by
//! `POST /token` and verified through `GET /users/me`.

pub mod client;
pub mod error;

pub use client::{ApiClient, DEFAULT_API_BASE_URL, DEFAULT_REQUEST_TIMEOUT_SECS};
pub use error::ApiError;
