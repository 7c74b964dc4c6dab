//! Route guard: decides whether a view may be shown for the current session.
//!
//! The guard follows the session's `watch` channel, so a decision is
//! recomputed on every transition instead of being polled. While the session
//! is still `Unknown` the decision is `Pending`; callers show a placeholder
//! and neither redirect nor render the protected view.

use futures::stream::{self, Stream};
use tokio::sync::watch;

use crate::auth::{SessionManager, SessionState};
use crate::models::UserRole;

/// Entry point unauthenticated visitors are sent to
pub const LOGIN_PATH: &str = "/login";

/// Who may see a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
    Role(UserRole),
}

#[derive(Debug, Clone, Copy)]
pub struct Route {
    pub path: &'static str,
    pub access: Access,
}

/// The client's views. Anything not listed is treated as protected.
pub const ROUTES: &[Route] = &[
    Route { path: "/login", access: Access::Public },
    Route { path: "/", access: Access::Authenticated },
    Route { path: "/dashboard", access: Access::Authenticated },
    Route { path: "/emotion", access: Access::Authenticated },
    Route { path: "/users", access: Access::Role(UserRole::Admin) },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session not resolved yet; render a placeholder.
    Pending,
    Allow,
    /// Not logged in; go to `to`, then come back to `from`.
    Redirect { to: String, from: String },
    /// Logged in but lacking the required role.
    Forbidden,
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardDecision::Allow)
    }
}

/// Strip query/fragment and trailing slashes
fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

/// Access level for `path`, falling back to `Authenticated`
pub fn access_for(path: &str) -> Access {
    let path = normalize(path);
    ROUTES
        .iter()
        .find(|route| route.path == path)
        .map(|route| route.access)
        .unwrap_or(Access::Authenticated)
}

/// Pure decision for one session snapshot
pub fn decide(state: &SessionState, access: Access, path: &str, login_path: &str) -> GuardDecision {
    if access == Access::Public {
        return GuardDecision::Allow;
    }
    match state {
        SessionState::Unknown => GuardDecision::Pending,
        SessionState::Anonymous => GuardDecision::Redirect {
            to: login_path.to_string(),
            from: normalize(path).to_string(),
        },
        SessionState::Authenticated { user, .. } => match access {
            Access::Role(role) if !user.has_role(role) => GuardDecision::Forbidden,
            _ => GuardDecision::Allow,
        },
    }
}

pub struct RouteGuard {
    rx: watch::Receiver<SessionState>,
    login_path: String,
}

impl RouteGuard {
    pub fn new(rx: watch::Receiver<SessionState>) -> Self {
        Self {
            rx,
            login_path: LOGIN_PATH.to_string(),
        }
    }

    pub fn for_session(session: &SessionManager) -> Self {
        Self::new(session.subscribe())
    }

    pub fn with_login_path(mut self, login_path: impl Into<String>) -> Self {
        self.login_path = login_path.into();
        self
    }

    /// Decision for `path` against the latest snapshot
    pub fn check(&self, path: &str) -> GuardDecision {
        decide(&self.rx.borrow(), access_for(path), path, &self.login_path)
    }

    fn check_and_mark(&mut self, path: &str) -> GuardDecision {
        let state = self.rx.borrow_and_update().clone();
        decide(&state, access_for(path), path, &self.login_path)
    }

    /// Wait until the session leaves `Unknown`, then decide
    pub async fn resolve(&mut self, path: &str) -> GuardDecision {
        let resolved = match self.rx.wait_for(SessionState::is_resolved).await {
            Ok(state) => Some(state.clone()),
            Err(_) => None,
        };
        match resolved {
            Some(state) => decide(&state, access_for(path), path, &self.login_path),
            // Session dropped; nothing more will change
            None => self.check(path),
        }
    }

    /// Wait for the next session transition and decide again.
    /// `None` once the session is gone.
    pub async fn next_decision(&mut self, path: &str) -> Option<GuardDecision> {
        self.rx.changed().await.ok()?;
        Some(self.check_and_mark(path))
    }

    /// Stream of decisions for `path`: the current one, then each change
    pub fn decisions(self, path: impl Into<String>) -> impl Stream<Item = GuardDecision> {
        let path = path.into();
        stream::unfold(
            (self, path, None::<GuardDecision>),
            |(mut guard, path, last)| async move {
                loop {
                    if last.is_some() {
                        guard.rx.changed().await.ok()?;
                    }
                    let decision = guard.check_and_mark(&path);
                    if last.as_ref() != Some(&decision) {
                        return Some((decision.clone(), (guard, path, Some(decision))));
                    }
                }
            },
        )
    }
}
