//! Request-scoped authorization context.

use keyward_core::AccessTokenClaims;
use uuid::Uuid;

use crate::error::{PermsError, Result};

/// What an authorized call knows about its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    claims: AccessTokenClaims,
    operation: String,
}

impl AuthContext {
    pub fn new(operation: impl Into<String>, claims: AccessTokenClaims) -> Self {
        Self {
            claims,
            operation: operation.into(),
        }
    }

    pub fn claims(&self) -> &AccessTokenClaims {
        &self.claims
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.claims.user_id
    }

    /// The caller's user id. Anonymous sessions are unauthorized.
    pub fn require_user_id(&self) -> Result<Uuid> {
        self.claims.user_id.ok_or(PermsError::MissingUserId)
    }

    pub fn into_claims(self) -> AccessTokenClaims {
        self.claims
    }
}
