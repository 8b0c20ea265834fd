//! Error types for the permissions module.

use keyward_core::{Permission, Role};
use thiserror::Error;

/// Error returned by an [`AuthenticateSource`](crate::AuthenticateSource).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during permission resolution and authorization.
#[derive(Debug, Error)]
pub enum PermsError {
    /// Role inheritance forms a cycle. Fatal at startup.
    #[error("cyclic role inheritance: {}", display_cycle(.cycle))]
    CyclicInheritance { cycle: Vec<Role> },

    /// A role inherits from a role that is not declared. Fatal at startup.
    #[error("role {role} inherits from undeclared role {inherited}")]
    UndefinedRole { role: Role, inherited: Role },

    /// No bearer token was presented.
    #[error("missing bearer token")]
    MissingToken,

    /// The token could not be turned into claims.
    #[error("authentication failed")]
    Authentication(#[source] BoxError),

    /// The session lacks at least one permission the operation requires.
    #[error("unauthorized: operation {operation} requires {}", display_permissions(.missing))]
    Unauthorized {
        operation: String,
        missing: Vec<Permission>,
    },

    /// The session is anonymous but the operation needs a user.
    #[error("unauthorized: claims do not contain a user id")]
    MissingUserId,
}

impl PermsError {
    /// True for configuration errors that must stop the process.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PermsError::CyclicInheritance { .. } | PermsError::UndefinedRole { .. }
        )
    }

    /// True if the caller authenticated but is not allowed to proceed.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            PermsError::Unauthorized { .. } | PermsError::MissingUserId
        )
    }

    /// True if the caller could not be authenticated at all.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, PermsError::MissingToken | PermsError::Authentication(_))
    }
}

fn display_cycle(cycle: &[Role]) -> String {
    cycle
        .iter()
        .map(Role::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn display_permissions(permissions: &[Permission]) -> String {
    permissions
        .iter()
        .map(Permission::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, PermsError>;
