//! Session roles, permissions, and account privilege tiers.
//!
//! These are two unrelated notions. A [`Role`] is attached to a session and
//! grants permissions through the resolver. A [`CredentialsRole`] is the
//! privilege tier of an account and only governs administrative actions
//! on other accounts.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// A role attached to a session, e.g. `auth:user`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    pub const ANON: &'static str = "auth:anon";
    pub const USER: &'static str = "auth:user";
    pub const ADMIN: &'static str = "auth:admin";
    pub const SUPER_ADMIN: &'static str = "auth:super_admin";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn anon() -> Self {
        Self::new(Self::ANON)
    }

    pub fn user() -> Self {
        Self::new(Self::USER)
    }

    pub fn admin() -> Self {
        Self::new(Self::ADMIN)
    }

    pub fn super_admin() -> Self {
        Self::new(Self::SUPER_ADMIN)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Role({})", self.0)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A named capability, e.g. `keys:read`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(String);

impl Permission {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Permission({})", self.0)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Permission {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Direct permissions of a role plus the roles it inherits from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Roles whose permissions this role also grants. Must not form a cycle.
    #[serde(default)]
    pub inherits: Vec<Role>,

    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl RoleConfig {
    pub fn new<I, P>(inherits: I, permissions: P) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Role>,
        P: IntoIterator,
        P::Item: Into<Permission>,
    {
        Self {
            inherits: inherits.into_iter().map(Into::into).collect(),
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }
}

/// Every role the service knows about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionsConfig {
    #[serde(default)]
    pub roles: BTreeMap<Role, RoleConfig>,
}

impl PermissionsConfig {
    /// Add or replace a role.
    pub fn with_role(mut self, role: impl Into<Role>, config: RoleConfig) -> Self {
        self.roles.insert(role.into(), config);
        self
    }

    /// The built-in hierarchy: anon < user < admin < super admin, with no
    /// permissions attached.
    pub fn default_hierarchy() -> Self {
        let none: [&str; 0] = [];
        Self::default()
            .with_role(Role::ANON, RoleConfig::new(none, none))
            .with_role(Role::USER, RoleConfig::new([Role::ANON], none))
            .with_role(Role::ADMIN, RoleConfig::new([Role::USER], none))
            .with_role(Role::SUPER_ADMIN, RoleConfig::new([Role::ADMIN], none))
    }
}

/// Resolved permissions per role.
pub type RolePermissions = BTreeMap<Role, BTreeSet<Permission>>;

/// Privilege tier of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialsRole {
    User,
    Admin,
    SuperAdmin,
}

impl CredentialsRole {
    /// Rank of the tier. Higher outranks lower.
    pub fn importance(&self) -> u8 {
        match self {
            CredentialsRole::User => 1,
            CredentialsRole::Admin => 2,
            CredentialsRole::SuperAdmin => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialsRole::User => "user",
            CredentialsRole::Admin => "admin",
            CredentialsRole::SuperAdmin => "super_admin",
        }
    }

    /// The session role granted to accounts of this tier.
    pub fn session_role(&self) -> Role {
        match self {
            CredentialsRole::User => Role::user(),
            CredentialsRole::Admin => Role::admin(),
            CredentialsRole::SuperAdmin => Role::super_admin(),
        }
    }
}

impl fmt::Display for CredentialsRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialsRole {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(CredentialsRole::User),
            "admin" => Ok(CredentialsRole::Admin),
            "super_admin" => Ok(CredentialsRole::SuperAdmin),
            other => Err(CoreError::UnknownVariant {
                kind: "credentials role",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_hierarchy() {
        let config = PermissionsConfig::default_hierarchy();
        assert_eq!(config.roles.len(), 4);
        assert_eq!(config.roles[&Role::user()].inherits, vec![Role::anon()]);
        assert_eq!(config.roles[&Role::super_admin()].inherits, vec![Role::admin()]);
        assert!(config.roles[&Role::anon()].inherits.is_empty());
    }

    #[test]
    fn test_permissions_config_from_json() {
        let json = r#"{
            "roles": {
                "auth:anon": { "permissions": ["jwk:read"] },
                "auth:user": { "inherits": ["auth:anon"], "permissions": ["shortcode:create"] }
            }
        }"#;
        let config: PermissionsConfig = serde_json::from_str(json).unwrap();

        let user = &config.roles[&Role::user()];
        assert_eq!(user.inherits, vec![Role::anon()]);
        assert_eq!(user.permissions, vec![Permission::new("shortcode:create")]);
        assert!(config.roles[&Role::anon()].inherits.is_empty());
    }

    #[test]
    fn test_credentials_role_importance_is_ordered() {
        assert!(CredentialsRole::User.importance() < CredentialsRole::Admin.importance());
        assert!(CredentialsRole::Admin.importance() < CredentialsRole::SuperAdmin.importance());
        assert_eq!(
            "super_admin".parse::<CredentialsRole>().unwrap(),
            CredentialsRole::SuperAdmin
        );
        assert!("root".parse::<CredentialsRole>().is_err());
        assert_eq!(CredentialsRole::Admin.session_role(), Role::admin());
    }
}
