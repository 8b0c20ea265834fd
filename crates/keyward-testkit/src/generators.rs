//! Proptest generators for property-based testing.

use proptest::prelude::*;

use keyward_core::{
    AccessTokenClaims, CredentialsRole, KeyUsage, Permission, PermissionsConfig, Role, RoleConfig,
    ShortCodeUsage,
};
use uuid::Uuid;

/// Generate a KeyUsage.
pub fn key_usage() -> impl Strategy<Value = KeyUsage> {
    prop_oneof![Just(KeyUsage::Auth), Just(KeyUsage::Refresh)]
}

/// Generate a ShortCodeUsage.
pub fn short_code_usage() -> impl Strategy<Value = ShortCodeUsage> {
    prop_oneof![
        Just(ShortCodeUsage::ValidateMail),
        Just(ShortCodeUsage::ResetPassword),
        Just(ShortCodeUsage::RequestRegister),
    ]
}

/// Generate a CredentialsRole.
pub fn credentials_role() -> impl Strategy<Value = CredentialsRole> {
    prop_oneof![
        Just(CredentialsRole::User),
        Just(CredentialsRole::Admin),
        Just(CredentialsRole::SuperAdmin),
    ]
}

/// Generate a short-code target.
pub fn target() -> impl Strategy<Value = String> {
    "[a-z]{1,12}@[a-z]{1,8}\\.(com|org|net)"
}

/// Generate a permission name.
pub fn permission() -> impl Strategy<Value = Permission> {
    "[a-z]{1,6}:[a-z]{1,6}".prop_map(Permission::new)
}

/// Generate claims for a user holding some of the given roles.
pub fn claims_over(roles: Vec<Role>) -> impl Strategy<Value = AccessTokenClaims> {
    let max = roles.len();
    (any::<u128>(), prop::sample::subsequence(roles, 0..=max))
        .prop_map(|(id, roles)| AccessTokenClaims::user(Uuid::from_u128(id), roles))
}

/// Parameters for an acyclic role hierarchy.
///
/// Role `r{i}` may only inherit from roles `r{j}` with `j < i`, so the
/// hierarchy is always a DAG.
#[derive(Debug, Clone)]
pub struct HierarchyParams {
    /// For each role, the indices of earlier roles it inherits.
    pub inherits: Vec<Vec<usize>>,
    /// For each role, the permissions it grants directly.
    pub grants: Vec<Vec<Permission>>,
}

impl HierarchyParams {
    pub fn role(index: usize) -> Role {
        Role::new(format!("r{}", index))
    }

    pub fn roles(&self) -> Vec<Role> {
        (0..self.inherits.len()).map(Self::role).collect()
    }

    pub fn to_config(&self) -> PermissionsConfig {
        self.inherits
            .iter()
            .zip(&self.grants)
            .enumerate()
            .fold(PermissionsConfig::default(), |config, (i, (parents, grants))| {
                config.with_role(
                    Self::role(i),
                    RoleConfig::new(
                        parents.iter().map(|&j| Self::role(j)),
                        grants.iter().cloned(),
                    ),
                )
            })
    }
}

/// Generate an acyclic hierarchy of 1 to `max_roles` roles.
pub fn hierarchy(max_roles: usize) -> impl Strategy<Value = HierarchyParams> {
    (1..=max_roles.max(1))
        .prop_flat_map(|n| {
            let inherits = (0..n)
                .map(|i| {
                    if i == 0 {
                        Just(Vec::<usize>::new()).boxed()
                    } else {
                        prop::collection::btree_set(0..i, 0..=i.min(3))
                            .prop_map(|set| set.into_iter().collect::<Vec<usize>>())
                            .boxed()
                    }
                })
                .collect::<Vec<_>>();
            let grants = prop::collection::vec(prop::collection::vec(permission(), 0..4), n);
            (inherits, grants)
        })
        .prop_map(|(inherits, grants)| HierarchyParams { inherits, grants })
}
