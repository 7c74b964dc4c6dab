//! Route guard driven by a live session.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;
use wiremock::MockServer;

use emoscope_core::auth::{MemoryTokenStore, TokenStore};
use emoscope_core::{GuardDecision, RouteGuard};

use common::*;

#[tokio::test]
async fn test_guard_pending_until_initialized_then_redirects() {
    let server = MockServer::start().await;
    let session = session(&server, Arc::new(MemoryTokenStore::new()));
    let mut guard = RouteGuard::for_session(&session);

    assert_eq!(guard.check("/dashboard"), GuardDecision::Pending);
    assert_eq!(guard.check("/login"), GuardDecision::Allow);

    session.initialize().await;

    assert_eq!(
        guard.resolve("/dashboard").await,
        GuardDecision::Redirect {
            to: "/login".to_string(),
            from: "/dashboard".to_string(),
        }
    );
}

#[tokio::test]
async fn test_guard_follows_login_and_logout() {
    let server = MockServer::start().await;
    mock_login(&server, "admin", "admin123", "tok-9").await;
    mock_me(&server, "tok-9", admin_profile()).await;
    let session = session(&server, Arc::new(MemoryTokenStore::new()));
    session.initialize().await;

    let mut decisions = Box::pin(RouteGuard::for_session(&session).decisions("/users"));
    assert!(matches!(decisions.next().await, Some(GuardDecision::Redirect { .. })));

    assert!(session.login("admin", "admin123").await);
    assert_eq!(decisions.next().await, Some(GuardDecision::Allow));

    session.logout();
    assert!(matches!(decisions.next().await, Some(GuardDecision::Redirect { .. })));
}

#[tokio::test]
async fn test_guard_forbids_non_admin_user_view() {
    let server = MockServer::start().await;
    mock_me(&server, "tok-user", json!({"username": "analyst", "role": "user"})).await;
    let session = session(&server, Arc::new(MemoryTokenStore::with_token("tok-user")));
    let mut guard = RouteGuard::for_session(&session);

    let startup = {
        let session = session.clone();
        tokio::spawn(async move { session.initialize().await })
    };

    let decision = tokio::time::timeout(Duration::from_secs(5), guard.resolve("/users"))
        .await
        .unwrap();
    assert_eq!(decision, GuardDecision::Forbidden);
    assert_eq!(guard.check("/emotion"), GuardDecision::Allow);

    startup.await.unwrap();
}

#[tokio::test]
async fn test_unrecognised_role_authenticates_but_is_forbidden_admin_view() {
    let server = MockServer::start().await;
    mock_me(&server, "tok-123", json!({"id": 1, "username": "a", "role": "analyst"})).await;
    let store = Arc::new(MemoryTokenStore::with_token("tok-123"));
    let session = session(&server, store.clone());

    session.initialize().await;

    assert!(session.is_authenticated());
    assert_eq!(store.get().unwrap().as_deref(), Some("tok-123"));
    let user = session.user().expect("user should be set");
    assert_eq!(user.role.as_deref(), Some("analyst"));

    let guard = RouteGuard::for_session(&session);
    assert_eq!(guard.check("/users"), GuardDecision::Forbidden);
    assert_eq!(guard.check("/dashboard"), GuardDecision::Allow);
}

#[tokio::test]
async fn test_rejected_login_before_startup_resolves_guard() {
    let server = MockServer::start().await;
    mock_login_rejected(&server).await;
    let store = Arc::new(MemoryTokenStore::new());
    let session = session(&server, store.clone());
    let mut guard = RouteGuard::for_session(&session);
    assert_eq!(guard.check("/dashboard"), GuardDecision::Pending);

    assert!(!session.login("admin", "wrong").await);

    let decision = tokio::time::timeout(Duration::from_secs(5), guard.resolve("/dashboard"))
        .await
        .unwrap();
    assert!(matches!(decision, GuardDecision::Redirect { .. }));
    assert_eq!(store.get().unwrap(), None);
}
