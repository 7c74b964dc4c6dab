//! Data models exchanged with the emotion analysis service.
//!
//! - `UserProfile`, `UserRole`, `UserId`: the account behind a session
//! - `NewUser`: admin user creation payload
//! - `TokenResponse`: token issuance response

pub mod user;

pub use user::{NewUser, TokenResponse, UserId, UserProfile, UserRole};
