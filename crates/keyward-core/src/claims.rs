//! Access token claims, as produced by the session introspection service.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::role::Role;

/// Authenticated information about a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenClaims {
    /// Absent for anonymous sessions.
    #[serde(rename = "userID", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,

    #[serde(default)]
    pub roles: Vec<Role>,

    /// Set when the session was created from a refresh token.
    #[serde(rename = "refreshTokenID", default, skip_serializing_if = "Option::is_none")]
    pub refresh_token_id: Option<String>,
}

impl AccessTokenClaims {
    /// Claims of an anonymous session.
    pub fn anonymous() -> Self {
        Self {
            user_id: None,
            roles: vec![Role::anon()],
            refresh_token_id: None,
        }
    }

    /// Claims of a logged-in user with the given roles.
    pub fn user(user_id: Uuid, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            user_id: Some(user_id),
            roles: roles.into_iter().collect(),
            refresh_token_id: None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        let id = Uuid::new_v4();
        let claims = AccessTokenClaims {
            user_id: Some(id),
            roles: vec![Role::user()],
            refresh_token_id: Some("rt-1".into()),
        };

        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["userID"], id.to_string());
        assert_eq!(json["roles"][0], "auth:user");
        assert_eq!(json["refreshTokenID"], "rt-1");
    }

    #[test]
    fn test_anonymous_omits_user() {
        let claims = AccessTokenClaims::anonymous();
        assert!(claims.is_anonymous());

        let json = serde_json::to_string(&claims).unwrap();
        assert_eq!(json, r#"{"roles":["auth:anon"]}"#);

        let back: AccessTokenClaims = serde_json::from_str(&json).unwrap();
        assert_eq!(back, claims);
    }
}
