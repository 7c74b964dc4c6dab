//! API client for the emotion analysis service's authentication endpoints.
//!
//! This module provides the `ApiClient` struct for requesting tokens,
//! verifying them against the current-user endpoint, and calling the
//! admin-only user management endpoints.

use std::time::Duration;

use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::models::{NewUser, TokenResponse, UserProfile};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Default base URL of the versioned API
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api/v1";

/// Default HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// API client for the emotion analysis service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client against `base_url`
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    /// Create a new API client with an explicit request timeout
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    /// Exchange a username and password for a bearer token.
    /// The server reads these as OAuth2 password form fields.
    pub async fn issue_token(&self, username: &str, password: &str) -> Result<String, ApiError> {
        let url = self.url("/token");
        debug!(url = %url, username, "Requesting access token");

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let body: TokenResponse = Self::parse_json(response).await?;

        if body.access_token.trim().is_empty() {
            return Err(ApiError::InvalidResponse(
                "Token response contained an empty access_token".to_string(),
            ));
        }
        if let Some(ref kind) = body.token_type {
            if !kind.eq_ignore_ascii_case("bearer") {
                debug!(token_type = %kind, "Unexpected token type, treating as bearer");
            }
        }

        Ok(body.access_token)
    }

    /// Fetch the profile that owns `token` (`GET /users/me`)
    pub async fn current_user(&self, token: &str) -> Result<UserProfile, ApiError> {
        let url = self.url("/users/me");
        debug!(url = %url, "Verifying token");

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        Self::parse_json(response).await
    }

    // ========================================================================
    // User management (admin)
    // ========================================================================

    /// List all accounts. Requires an admin token.
    pub async fn list_users(&self) -> Result<Vec<UserProfile>, ApiError> {
        let url = self.url("/users");
        let response = self
            .client
            .get(&url)
            .headers(self.auth_headers()?)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        Self::parse_json(response).await
    }

    /// Create an account. Requires an admin token.
    pub async fn create_user(&self, user: &NewUser) -> Result<UserProfile, ApiError> {
        let url = self.url("/users");
        debug!(url = %url, username = %user.username, role = user.role.as_str(), "Creating user");

        let response = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .json(user)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        Self::parse_json(response).await
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        if let Some(ref token) = self.token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::InvalidResponse("Token is not a valid header value".to_string()))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ApiClient::new("http://localhost:8000/api/v1/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000/api/v1");
        assert_eq!(client.url("/token"), "http://localhost:8000/api/v1/token");
    }

    #[test]
    fn test_with_token_shares_base_url() {
        let client = ApiClient::new(DEFAULT_API_BASE_URL).unwrap();
        assert!(client.token().is_none());

        let authed = client.with_token("tok-1".to_string());
        assert_eq!(authed.token(), Some("tok-1"));
        assert_eq!(authed.base_url(), client.base_url());
        assert!(client.token().is_none());
    }

    #[test]
    fn test_auth_headers_include_bearer() {
        let client = ApiClient::new(DEFAULT_API_BASE_URL)
            .unwrap()
            .with_token("abc".to_string());
        let headers = client.auth_headers().unwrap();
        assert_eq!(
            headers.get(header::AUTHORIZATION).unwrap().to_str().unwrap(),
            "Bearer abc"
        );
    }

    #[test]
    fn test_auth_headers_reject_invalid_token() {
        let client = ApiClient::new(DEFAULT_API_BASE_URL)
            .unwrap()
            .with_token("bad\ntoken".to_string());
        assert!(client.auth_headers().is_err());
    }
}
