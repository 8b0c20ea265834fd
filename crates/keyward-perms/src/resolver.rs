//! Permission resolution.
//!
//! Every role grants its own permissions plus those of every role it
//! inherits from, transitively. Resolution runs once at startup; the result
//! is read-only afterwards.

use std::collections::{BTreeSet, HashMap};

use keyward_core::{Permission, PermissionsConfig, Role, RolePermissions};

use crate::error::{PermsError, Result};

/// Resolve the full permission set of every declared role.
///
/// Fails if the inheritance graph has a cycle or references an undeclared
/// role. Either is a configuration error: there is no partial result.
pub fn resolve(config: &PermissionsConfig) -> Result<RolePermissions> {
    let mut resolver = Resolver {
        config,
        marks: HashMap::new(),
        path: Vec::new(),
        resolved: RolePermissions::new(),
    };

    // BTreeMap iteration keeps the reported cycle deterministic.
    for role in config.roles.keys() {
        resolver.visit(role)?;
    }

    Ok(resolver.resolved)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

struct Resolver<'a> {
    config: &'a PermissionsConfig,
    marks: HashMap<Role, Mark>,
    /// Roles currently being expanded, outermost first.
    path: Vec<Role>,
    resolved: RolePermissions,
}

impl Resolver<'_> {
    fn visit(&mut self, role: &Role) -> Result<()> {
        match self.marks.get(role) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                let start = self.path.iter().position(|r| r == role).unwrap_or(0);
                let mut cycle = self.path[start..].to_vec();
                cycle.push(role.clone());
                return Err(PermsError::CyclicInheritance { cycle });
            }
            None => {}
        }

        let config = self.config;
        let Some(role_config) = config.roles.get(role) else {
            // Top-level roles are always declared, so there is a parent.
            let inheriting = self.path.last().cloned().unwrap_or_else(|| role.clone());
            return Err(PermsError::UndefinedRole {
                role: inheriting,
                inherited: role.clone(),
            });
        };

        self.marks.insert(role.clone(), Mark::InProgress);
        self.path.push(role.clone());

        let mut granted: BTreeSet<Permission> = role_config.permissions.iter().cloned().collect();
        for parent in &role_config.inherits {
            self.visit(parent)?;
            if let Some(inherited) = self.resolved.get(parent) {
                granted.extend(inherited.iter().cloned());
            }
        }

        self.path.pop();
        self.marks.insert(role.clone(), Mark::Done);
        self.resolved.insert(role.clone(), granted);

        Ok(())
    }
}

/// Resolved permissions, ready for lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPermissions {
    by_role: RolePermissions,
}

impl ResolvedPermissions {
    /// Resolve a configuration. See [`resolve`].
    pub fn resolve(config: &PermissionsConfig) -> Result<Self> {
        let by_role = resolve(config)?;
        tracing::debug!(roles = by_role.len(), "permissions resolved");
        Ok(Self { by_role })
    }

    /// Permissions of a single role, if declared.
    pub fn of(&self, role: &Role) -> Option<&BTreeSet<Permission>> {
        self.by_role.get(role)
    }

    /// Union of the permissions of every listed role. Undeclared roles
    /// grant nothing.
    pub fn granted_to<'r>(&self, roles: impl IntoIterator<Item = &'r Role>) -> BTreeSet<Permission> {
        roles
            .into_iter()
            .filter_map(|role| self.by_role.get(role))
            .flat_map(|perms| perms.iter().cloned())
            .collect()
    }

    pub fn as_map(&self) -> &RolePermissions {
        &self.by_role
    }
}
