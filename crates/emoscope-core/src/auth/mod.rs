//! Authentication module for managing the client session.
//!
//! This module provides:
//! - `SessionManager`: login, startup verification, revalidation and logout,
//!   published as `SessionState` snapshots
//! - `TokenStore`: durable storage for the bearer token (file, keyring, memory)
//! - `AuthError`: failure kinds recovered inside the session manager
//!
//! The server issues tokens that expire after 30 minutes.

pub mod error;
pub mod session;
pub mod store;

pub use error::{AuthError, StoreError};
pub use session::{SessionManager, SessionState, DEFAULT_REVALIDATE_MINUTES, TOKEN_LIFETIME_MINUTES};
pub use store::{FileTokenStore, KeyringTokenStore, MemoryTokenStore, StoredToken, TokenStore};
