use thiserror::Error;

use crate::api::ApiError;

/// Errors raised by token store backends
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Token file I/O failed at {path}: {message}")]
    Io { path: String, message: String },

    #[error("Keyring error: {0}")]
    Keyring(String),

    #[error("Token file is not valid JSON: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn io(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        StoreError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

/// Failure kinds the session manager recovers from.
///
/// These never cross the session manager's public API; they are logged and
/// collapsed into a `false` login result or a move to the anonymous state.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Token expired or revoked")]
    TokenExpiredOrRevoked,

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Token storage unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),
}

impl AuthError {
    /// Classify a failure from `POST /token`
    pub(crate) fn from_login(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized | ApiError::BadRequest(_) => AuthError::InvalidCredentials,
            other => Self::from_transport(other),
        }
    }

    /// Classify a failure from `GET /users/me`
    pub(crate) fn from_verify(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized | ApiError::AccessDenied(_) => AuthError::TokenExpiredOrRevoked,
            other => Self::from_transport(other),
        }
    }

    fn from_transport(err: ApiError) -> Self {
        match err {
            ApiError::NetworkError(e) => AuthError::NetworkFailure(e.to_string()),
            ApiError::InvalidResponse(msg) => AuthError::MalformedResponse(msg),
            other => AuthError::NetworkFailure(other.to_string()),
        }
    }
}
