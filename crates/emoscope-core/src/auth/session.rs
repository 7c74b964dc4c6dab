//! Session manager: the single owner of authentication state.
//!
//! State lives in a `watch` channel so every reader sees a whole
//! `SessionState` value. Login, startup verification and revalidation are
//! serialized by an async mutex. `logout` never waits on them; it advances
//! the session generation instead, and an operation that finishes under an
//! older generation drops its result.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::models::UserProfile;

use super::{AuthError, TokenStore};

/// Server-side token lifetime in minutes.
pub const TOKEN_LIFETIME_MINUTES: u64 = 30;

/// Default revalidation period, comfortably inside the token lifetime.
pub const DEFAULT_REVALIDATE_MINUTES: u64 = 5;

/// Snapshot of the session as seen by guards and views.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// Startup verification has not finished yet.
    Unknown,
    Anonymous,
    Authenticated { user: UserProfile, token: String },
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }

    /// True once startup verification has produced a definite answer
    pub fn is_resolved(&self) -> bool {
        !matches!(self, SessionState::Unknown)
    }

    pub fn user(&self) -> Option<&UserProfile> {
        match self {
            SessionState::Authenticated { user, .. } => Some(user),
            _ => None,
        }
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            SessionState::Authenticated { token, .. } => Some(token),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Unknown => "unknown",
            SessionState::Anonymous => "anonymous",
            SessionState::Authenticated { .. } => "authenticated",
        }
    }
}

struct Inner {
    api: ApiClient,
    store: Box<dyn TokenStore>,
    /// Held for the whole of initialize/login/revalidate
    op_lock: tokio::sync::Mutex<()>,
    /// Guards every commit; never held across an await
    generation: Mutex<u64>,
    state_tx: watch::Sender<SessionState>,
}

/// Handle to the process-wide session. Clones share the same state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(api: ApiClient, store: Box<dyn TokenStore>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Unknown);
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                op_lock: tokio::sync::Mutex::new(()),
                generation: Mutex::new(0),
                state_tx,
            }),
        }
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Current session snapshot
    pub fn snapshot(&self) -> SessionState {
        self.inner.state_tx.borrow().clone()
    }

    /// Receiver notified on every session transition
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state_tx.borrow().is_authenticated()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.inner.state_tx.borrow().user().cloned()
    }

    pub fn token(&self) -> Option<String> {
        self.inner.state_tx.borrow().token().map(str::to_string)
    }

    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    pub fn store_name(&self) -> &str {
        self.inner.store.name()
    }

    /// API client carrying the session's bearer token, if authenticated
    pub fn authorized_client(&self) -> Option<ApiClient> {
        self.token().map(|token| self.inner.api.with_token(token))
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Restore the session from the token store.
    ///
    /// Leaves the session `Authenticated` if the stored token verifies and
    /// `Anonymous` (with an empty store) otherwise. Never fails.
    pub async fn initialize(&self) {
        let _op = self.inner.op_lock.lock().await;
        let generation = self.current_generation();

        let stored = match self.inner.store.get() {
            Ok(token) => token,
            Err(e) => {
                let err = AuthError::from(e);
                warn!(error = %err, store = self.store_name(), "Treating token store as empty");
                None
            }
        };

        let Some(token) = stored else {
            debug!("No stored token");
            self.expire(generation);
            return;
        };

        match self.verify(&token).await {
            Ok(user) => {
                let name = user.display_name();
                if self.commit(generation, None, SessionState::Authenticated { user, token }) {
                    info!(user = %name, "Session restored");
                }
            }
            Err(err) => {
                warn!(error = %err, "Stored token rejected");
                self.expire(generation);
            }
        }
    }

    /// Exchange credentials for a token and open a session.
    ///
    /// Returns `false` on any failure. The token store and an existing
    /// session are then left as they were; a session that was still
    /// `Unknown` becomes `Anonymous`.
    pub async fn login(&self, username: &str, password: &str) -> bool {
        let _op = self.inner.op_lock.lock().await;
        let logged_in = self.login_locked(username, password).await;
        if !logged_in {
            self.settle_unknown();
        }
        logged_in
    }

    /// Caller holds the op lock
    async fn login_locked(&self, username: &str, password: &str) -> bool {
        if username.trim().is_empty() || password.is_empty() {
            debug!("Username and password required");
            return false;
        }

        let generation = self.current_generation();

        let token = match self.inner.api.issue_token(username, password).await {
            Ok(token) => token,
            Err(e) => {
                let err = AuthError::from_login(e);
                warn!(error = %err, username, "Login failed");
                return false;
            }
        };

        let user = match self.verify(&token).await {
            Ok(user) => user,
            Err(err) => {
                warn!(error = %err, username, "Issued token failed verification");
                return false;
            }
        };

        let committed = self.commit(
            generation,
            Some(&token),
            SessionState::Authenticated {
                user,
                token: token.clone(),
            },
        );
        if committed {
            info!(username, "Logged in");
        }
        committed
    }

    /// Re-check the current token. Any failure ends the session.
    pub async fn revalidate(&self) {
        let _op = self.inner.op_lock.lock().await;
        let generation = self.current_generation();

        let Some(token) = self.token() else {
            return;
        };

        match self.verify(&token).await {
            Ok(user) => {
                self.commit(generation, None, SessionState::Authenticated { user, token });
            }
            Err(err) => {
                warn!(error = %err, "Session no longer valid, logging out");
                self.expire(generation);
            }
        }
    }

    /// End the session: clear the token store and go `Anonymous`.
    ///
    /// Also supersedes any login or verification still in flight.
    pub fn logout(&self) {
        let mut generation = self.lock_generation();
        *generation += 1;
        self.reset_locked();
    }

    /// Log out if `err` says the token `client` sent was rejected and that
    /// token is still the session's. Returns whether it did.
    ///
    /// A rejection of a token the session has since replaced is ignored.
    pub fn handle_api_error(&self, client: &ApiClient, err: &ApiError) -> bool {
        if !err.is_unauthorized() {
            return false;
        }
        let Some(rejected) = client.token() else {
            return false;
        };

        let mut generation = self.lock_generation();
        let current = self.token();
        if current.as_deref() != Some(rejected) {
            debug!("Rejected token is no longer current, ignoring");
            return false;
        }
        warn!(error = %AuthError::TokenExpiredOrRevoked, "Protected call rejected token");
        *generation += 1;
        self.reset_locked();
        true
    }

    /// Revalidate every `period` in the background until the last
    /// `SessionManager` handle is dropped.
    pub fn spawn_revalidation(&self, period: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately; skip that tick
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    debug!("Session manager dropped, stopping revalidation");
                    break;
                };
                SessionManager { inner }.revalidate().await;
            }
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn verify(&self, token: &str) -> Result<UserProfile, AuthError> {
        self.inner
            .api
            .current_user(token)
            .await
            .map_err(AuthError::from_verify)
    }

    fn lock_generation(&self) -> MutexGuard<'_, u64> {
        // A plain counter cannot be left half-written
        self.inner.generation.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current_generation(&self) -> u64 {
        *self.lock_generation()
    }

    /// Persist `persist` (if any) and publish `next`, unless a logout has
    /// happened since `generation` was read.
    fn commit(&self, generation: u64, persist: Option<&str>, next: SessionState) -> bool {
        let current = self.lock_generation();
        if *current != generation {
            debug!(started = generation, current = *current, "Discarding superseded session result");
            return false;
        }

        if let Some(token) = persist {
            if let Err(e) = self.inner.store.set(token) {
                let err = AuthError::from(e);
                warn!(error = %err, store = self.store_name(), "Could not persist token");
                return false;
            }
        }

        self.inner.state_tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        true
    }

    /// Resolve a session nothing has restored yet to `Anonymous`
    fn settle_unknown(&self) {
        let _generation = self.lock_generation();
        self.inner.state_tx.send_if_modified(|state| {
            if *state == SessionState::Unknown {
                *state = SessionState::Anonymous;
                true
            } else {
                false
            }
        });
    }

    /// Logout semantics for failures, skipped if already superseded
    fn expire(&self, generation: u64) {
        let current = self.lock_generation();
        if *current != generation {
            debug!(started = generation, current = *current, "Session already reset");
            return;
        }
        self.reset_locked();
    }

    /// Caller holds the generation lock
    fn reset_locked(&self) {
        if let Err(e) = self.inner.store.clear() {
            let err = AuthError::from(e);
            warn!(error = %err, store = self.store_name(), "Could not clear stored token");
        }
        let changed = self.inner.state_tx.send_if_modified(|state| {
            if *state == SessionState::Anonymous {
                false
            } else {
                *state = SessionState::Anonymous;
                true
            }
        });
        if changed {
            info!("Session ended");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryTokenStore;
    use crate::models::UserId;

    fn manager_with(store: Arc<MemoryTokenStore>) -> SessionManager {
        // Port 9 (discard) so any accidental request fails fast
        let api = ApiClient::new("http://127.0.0.1:9").unwrap();
        SessionManager::new(api, Box::new(store))
    }

    fn profile() -> UserProfile {
        UserProfile {
            id: Some(UserId::Number(1)),
            username: Some("a".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_state_accessors() {
        let state = SessionState::Authenticated {
            user: profile(),
            token: "tok".to_string(),
        };
        assert!(state.is_authenticated());
        assert!(state.is_resolved());
        assert_eq!(state.token(), Some("tok"));
        assert_eq!(state.user(), Some(&profile()));
        assert_eq!(state.label(), "authenticated");

        assert!(!SessionState::Unknown.is_resolved());
        assert!(SessionState::Anonymous.is_resolved());
        assert!(SessionState::Anonymous.user().is_none());
        assert!(SessionState::Unknown.token().is_none());
    }

    #[test]
    fn test_state_serializes_tagged() {
        let json = serde_json::to_value(SessionState::Anonymous).unwrap();
        assert_eq!(json, serde_json::json!({"state": "anonymous"}));
    }

    #[tokio::test]
    async fn test_starts_unknown() {
        let manager = manager_with(Arc::new(MemoryTokenStore::new()));
        assert_eq!(manager.snapshot(), SessionState::Unknown);
        assert!(!manager.is_authenticated());
        assert!(manager.authorized_client().is_none());
    }

    #[tokio::test]
    async fn test_logout_clears_and_is_idempotent() {
        let store = Arc::new(MemoryTokenStore::with_token("tok-1"));
        let manager = manager_with(store.clone());
        let mut rx = manager.subscribe();

        manager.logout();
        assert_eq!(manager.snapshot(), SessionState::Anonymous);
        assert_eq!(store.get().unwrap(), None);
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        manager.logout();
        manager.logout();
        assert_eq!(manager.snapshot(), SessionState::Anonymous);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_commit_discarded_after_logout() {
        let store = Arc::new(MemoryTokenStore::new());
        let manager = manager_with(store.clone());

        let generation = manager.current_generation();
        manager.logout();
        let committed = manager.commit(
            generation,
            Some("late"),
            SessionState::Authenticated {
                user: profile(),
                token: "late".to_string(),
            },
        );

        assert!(!committed);
        assert_eq!(store.get().unwrap(), None);
        assert_eq!(manager.snapshot(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn test_blank_credentials_rejected_without_request() {
        let store = Arc::new(MemoryTokenStore::new());
        let manager = manager_with(store.clone());

        assert!(!manager.login("", "secret").await);
        assert!(!manager.login("   ", "secret").await);
        assert!(!manager.login("admin", "").await);
        assert_eq!(manager.snapshot(), SessionState::Anonymous);
        assert_eq!(store.get().unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_login_keeps_authenticated_session() {
        let store = Arc::new(MemoryTokenStore::new());
        let manager = manager_with(store.clone());
        let generation = manager.current_generation();
        manager.commit(
            generation,
            Some("tok"),
            SessionState::Authenticated {
                user: profile(),
                token: "tok".to_string(),
            },
        );
        let mut rx = manager.subscribe();

        assert!(!manager.login("admin", "").await);

        assert_eq!(manager.token().as_deref(), Some("tok"));
        assert_eq!(store.get().unwrap().as_deref(), Some("tok"));
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_handle_api_error_logs_out_on_unauthorized() {
        let store = Arc::new(MemoryTokenStore::new());
        let manager = manager_with(store.clone());
        let generation = manager.current_generation();
        manager.commit(
            generation,
            Some("tok"),
            SessionState::Authenticated {
                user: profile(),
                token: "tok".to_string(),
            },
        );
        assert!(manager.is_authenticated());

        let client = manager.authorized_client().unwrap();
        assert!(!manager.handle_api_error(&client, &ApiError::RateLimited));
        assert!(manager.is_authenticated());

        // Unauthenticated clients never end the session
        assert!(!manager.handle_api_error(manager.api(), &ApiError::Unauthorized));
        assert!(manager.is_authenticated());

        assert!(manager.handle_api_error(&client, &ApiError::Unauthorized));
        assert!(!manager.is_authenticated());
        assert_eq!(store.get().unwrap(), None);
    }

    #[tokio::test]
    async fn test_handle_api_error_ignores_replaced_token() {
        let store = Arc::new(MemoryTokenStore::new());
        let manager = manager_with(store.clone());
        let authenticate = |token: &str| {
            let generation = manager.current_generation();
            manager.commit(
                generation,
                Some(token),
                SessionState::Authenticated {
                    user: profile(),
                    token: token.to_string(),
                },
            )
        };

        assert!(authenticate("tok-A"));
        let stale = manager.authorized_client().unwrap();
        manager.logout();
        assert!(authenticate("tok-B"));

        assert!(!manager.handle_api_error(&stale, &ApiError::Unauthorized));
        assert_eq!(manager.token().as_deref(), Some("tok-B"));
        assert_eq!(store.get().unwrap().as_deref(), Some("tok-B"));
    }
}
