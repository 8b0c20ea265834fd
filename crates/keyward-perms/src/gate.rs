//! Bearer-token authorization.
//!
//! A call is authenticated through an external [`AuthenticateSource`], then
//! authorized against the permissions its operation requires. Authorization
//! is all-or-nothing: every required permission must be granted by at least
//! one of the session's roles.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use keyward_core::{AccessTokenClaims, Permission, PermissionsConfig};
use tracing::instrument;

use crate::context::AuthContext;
use crate::error::{BoxError, PermsError, Result};
use crate::resolver::ResolvedPermissions;

/// Required permissions per operation name.
pub type OperationPermissions = BTreeMap<String, Vec<Permission>>;

/// Turns a bearer token into session claims.
#[async_trait]
pub trait AuthenticateSource: Send + Sync {
    async fn authenticate(&self, token: &str) -> std::result::Result<AccessTokenClaims, BoxError>;
}

#[async_trait]
impl<T: AuthenticateSource + ?Sized> AuthenticateSource for Arc<T> {
    async fn authenticate(&self, token: &str) -> std::result::Result<AccessTokenClaims, BoxError> {
        (**self).authenticate(token).await
    }
}

/// Authorizes inbound calls.
pub struct BearerAuthGate<A> {
    source: A,
    granted: ResolvedPermissions,
    required: HashMap<String, BTreeSet<Permission>>,
}

impl<A: AuthenticateSource> BearerAuthGate<A> {
    /// Build a gate. Resolves the role hierarchy, so a cyclic or dangling
    /// inheritance fails here.
    pub fn new(
        source: A,
        permissions: &PermissionsConfig,
        operations: &OperationPermissions,
    ) -> Result<Self> {
        let granted = ResolvedPermissions::resolve(permissions)?;
        let required = operations
            .iter()
            .map(|(operation, perms)| (operation.clone(), perms.iter().cloned().collect()))
            .collect();

        Ok(Self {
            source,
            granted,
            required,
        })
    }

    /// Permissions an operation requires. Operations without an entry
    /// require none.
    pub fn required_permissions(&self, operation: &str) -> BTreeSet<Permission> {
        self.required.get(operation).cloned().unwrap_or_default()
    }

    /// Whether an operation has an entry in the configuration.
    pub fn is_configured(&self, operation: &str) -> bool {
        self.required.contains_key(operation)
    }

    pub fn resolved(&self) -> &ResolvedPermissions {
        &self.granted
    }

    /// Authenticate the token and check it against the operation.
    ///
    /// Authentication failures are never retried. On success the claims are
    /// returned in an [`AuthContext`] for the rest of the request.
    #[instrument(skip_all, fields(operation = %operation))]
    pub async fn authorize(&self, operation: &str, token: &str) -> Result<AuthContext> {
        let token = token.trim();
        if token.is_empty() {
            return Err(PermsError::MissingToken);
        }

        let claims = self
            .source
            .authenticate(token)
            .await
            .map_err(PermsError::Authentication)?;

        self.check(operation, claims)
    }

    /// The permission check alone, for claims obtained elsewhere.
    pub fn check(&self, operation: &str, claims: AccessTokenClaims) -> Result<AuthContext> {
        let required = match self.required.get(operation) {
            Some(required) => required,
            None => {
                tracing::debug!(operation, "operation has no permission entry, allowing");
                return Ok(AuthContext::new(operation, claims));
            }
        };

        let granted = self.granted.granted_to(&claims.roles);

        if required.intersection(&granted).count() != required.len() {
            let missing: Vec<Permission> = required.difference(&granted).cloned().collect();
            tracing::warn!(
                operation,
                required = ?required,
                missing = ?missing,
                roles = ?claims.roles,
                "check permissions"
            );
            return Err(PermsError::Unauthorized {
                operation: operation.to_string(),
                missing,
            });
        }

        Ok(AuthContext::new(operation, claims))
    }
}
