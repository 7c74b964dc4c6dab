use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Role assigned to an account by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::User => "user",
        }
    }

    /// Known role for a server-side name, `None` for anything else
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "admin" => Some(UserRole::Admin),
            "user" => Some(UserRole::User),
            _ => None,
        }
    }
}

/// Account identifier; the server has used both numeric and string ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserId::Number(n) => write!(f, "{}", n),
            UserId::Text(s) => f.write_str(s),
        }
    }
}

/// Profile returned by `GET /users/me`.
///
/// All known fields are optional and anything else the server sends is kept
/// in `extra`, so a profile round-trips unchanged whatever its shape. `role`
/// stays the raw server value; [`UserProfile::user_role`] interprets it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    /// Best human-readable name for the account
    pub fn display_name(&self) -> String {
        if let Some(ref username) = self.username {
            return username.clone();
        }
        if let Some(name) = self.extra.get("name").and_then(Value::as_str) {
            return name.to_string();
        }
        match self.id {
            Some(ref id) => format!("user #{}", id),
            None => "unknown user".to_string(),
        }
    }

    /// Role as one the client knows, `None` if absent or unrecognised
    pub fn user_role(&self) -> Option<UserRole> {
        self.role.as_deref().and_then(UserRole::from_name)
    }

    pub fn has_role(&self, role: UserRole) -> bool {
        self.user_role() == Some(role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(UserRole::Admin)
    }
}

/// Payload for `POST /users`.
#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
}

/// Response body of `POST /token`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_server_profile() {
        let json = r#"{"id":"65f1c2","username":"admin","email":"admin@example.com","role":"admin","is_active":true,"created_at":"2025-03-30T08:00:00"}"#;
        let profile: UserProfile = serde_json::from_str(json).expect("profile should parse");

        assert_eq!(profile.id, Some(UserId::Text("65f1c2".to_string())));
        assert_eq!(profile.username.as_deref(), Some("admin"));
        assert!(profile.is_admin());
        assert_eq!(profile.is_active, Some(true));
        assert_eq!(
            profile.extra.get("created_at"),
            Some(&json!("2025-03-30T08:00:00"))
        );
    }

    #[test]
    fn test_parse_minimal_profile_keeps_unknown_fields() {
        let value = json!({"id": 1, "name": "a"});
        let profile: UserProfile = serde_json::from_value(value.clone()).expect("profile should parse");

        assert_eq!(profile.id, Some(UserId::Number(1)));
        assert_eq!(profile.user_role(), None);
        assert_eq!(profile.display_name(), "a");
        assert_eq!(serde_json::to_value(&profile).unwrap(), value);
    }

    #[test]
    fn test_display_name_fallbacks() {
        let profile = UserProfile {
            id: Some(UserId::Number(7)),
            ..Default::default()
        };
        assert_eq!(profile.display_name(), "user #7");
        assert_eq!(UserProfile::default().display_name(), "unknown user");
    }

    #[test]
    fn test_unknown_role_is_kept_but_grants_nothing() {
        let value = json!({"id": 1, "username": "a", "role": "analyst"});
        let profile: UserProfile = serde_json::from_value(value.clone()).expect("profile should parse");

        assert_eq!(profile.role.as_deref(), Some("analyst"));
        assert_eq!(profile.user_role(), None);
        assert!(!profile.is_admin());
        assert!(!profile.has_role(UserRole::User));
        assert_eq!(serde_json::to_value(&profile).unwrap(), value);
    }

    #[test]
    fn test_role_names() {
        assert_eq!(UserRole::from_name("admin"), Some(UserRole::Admin));
        assert_eq!(UserRole::from_name(UserRole::User.as_str()), Some(UserRole::User));
        assert_eq!(UserRole::from_name("Admin"), None);
    }

    #[test]
    fn test_token_response_without_type() {
        let resp: TokenResponse =
            serde_json::from_str(r#"{"access_token":"tok-9"}"#).expect("token should parse");
        assert_eq!(resp.access_token, "tok-9");
        assert!(resp.token_type.is_none());
    }
}
