//! Privilege tiers for credential administration.
//!
//! These tiers are not session roles. They decide who may change whose tier,
//! and never feed into permission resolution.

use keyward_core::CredentialsRole;
use uuid::Uuid;

use crate::error::RoleUpdateError;

/// Result of an accepted role-update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleUpdate {
    /// The target already holds the requested tier.
    Unchanged,
    /// The caller may move the target to this tier.
    Apply(CredentialsRole),
}

/// Decide whether `current_user` (holding `current_role`) may move
/// `target_user` from `target_role` to `new_role`.
///
/// Rules, in order:
/// - nobody changes their own tier;
/// - an upgrade may not go above the caller's own tier;
/// - a downgrade is only allowed on targets of strictly lower tier;
/// - requesting the target's current tier changes nothing.
pub fn check_role_update(
    current_user: Uuid,
    current_role: CredentialsRole,
    target_user: Uuid,
    target_role: CredentialsRole,
    new_role: CredentialsRole,
) -> Result<RoleUpdate, RoleUpdateError> {
    if current_user == target_user {
        return Err(RoleUpdateError::SelfUpdate);
    }

    let current = current_role.importance();
    let target = target_role.importance();
    let new = new_role.importance();

    if new >= target && new > current {
        return Err(RoleUpdateError::UpgradeAboveOwnRole {
            current: current_role,
            requested: new_role,
        });
    }

    if new <= target && target >= current {
        return Err(RoleUpdateError::DowngradeNotLower {
            current: current_role,
            requested: new_role,
        });
    }

    if new == target {
        return Ok(RoleUpdate::Unchanged);
    }

    Ok(RoleUpdate::Apply(new_role))
}
