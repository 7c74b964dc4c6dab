//! Shared helpers for tests against a mocked emotion analysis API.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use emoscope_core::auth::MemoryTokenStore;
use emoscope_core::{ApiClient, SessionManager};

/// Session over a memory store, talking to `server`
pub fn session(server: &MockServer, store: Arc<MemoryTokenStore>) -> SessionManager {
    let api = ApiClient::with_timeout(&server.uri(), Duration::from_secs(5))
        .expect("client should build");
    SessionManager::new(api, Box::new(store))
}

pub fn admin_profile() -> Value {
    json!({
        "id": "65f1c2",
        "username": "admin",
        "email": "admin@example.com",
        "role": "admin",
        "is_active": true
    })
}

/// `POST /token` for `username`/`password` answers `token`
pub async fn mock_login(server: &MockServer, username: &str, password: &str, token: &str) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains(format!("username={}", username)))
        .and(body_string_contains(format!("password={}", password)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": token,
            "token_type": "bearer"
        })))
        .mount(server)
        .await;
}

/// `POST /token` rejects everything
pub async fn mock_login_rejected(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Incorrect username or password"})),
        )
        .mount(server)
        .await;
}

/// `GET /users/me` with `token` answers `profile`
pub async fn mock_me(server: &MockServer, token: &str, profile: Value) {
    Mock::given(method("GET"))
        .and(path("/users/me"))
        .and(header("authorization", format!("Bearer {}", token).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile))
        .mount(server)
        .await;
}

/// `GET /users/me` with `token` answers 401
pub async fn mock_me_rejected(server: &MockServer, token: &str) {
    Mock::given(method("GET"))
        .and(path("/users/me"))
        .and(header("authorization", format!("Bearer {}", token).as_str()))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Could not validate credentials"})),
        )
        .mount(server)
        .await;
}
