//! Core library for emoscope, the emotion analysis client.
//!
//! - `auth`: session manager, token stores, auth failure taxonomy
//! - `guard`: route access decisions driven by the session
//! - `api`: HTTP client for the authentication and user endpoints
//! - `config`: on-disk configuration and environment overrides
//! - `models`: user profile and request/response types

pub mod api;
pub mod auth;
pub mod config;
pub mod guard;
pub mod models;

pub use api::{ApiClient, ApiError};
pub use auth::{SessionManager, SessionState, TokenStore};
pub use config::Config;
pub use guard::{Access, GuardDecision, RouteGuard};
pub use models::{UserProfile, UserRole};
