//! The Keyward service: one handle over the key registry, the short-code
//! broker and the bearer-auth gate.

use std::sync::Arc;

use keyward_core::{Envelope, PermissionsConfig};
use keyward_perms::{AuthContext, AuthenticateSource, BearerAuthGate};
use keyward_store::Store;

use crate::config::KeywardConfig;
use crate::error::Result;
use crate::keyring::KeyRing;
use crate::rotation::KeyRotator;
use crate::short_codes::ShortCodeService;

/// The main Keyward struct.
///
/// Provides a unified API for:
/// - Rotating keys and reading them back as JWKs
/// - Issuing and redeeming short codes
/// - Authorizing inbound calls
pub struct Keyward<S, A> {
    config: KeywardConfig,
    store: Arc<S>,
    envelope: Arc<Envelope>,
    rotator: KeyRotator<S>,
    keyring: KeyRing<S>,
    short_codes: ShortCodeService<S>,
    gate: BearerAuthGate<A>,
}

impl<S: Store, A: AuthenticateSource> Keyward<S, A> {
    /// Assemble the service.
    ///
    /// Fails on an invalid configuration, including a role hierarchy that
    /// does not resolve. Either way the process should not start.
    pub fn new(config: KeywardConfig, envelope: Envelope, store: S, source: A) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(store);
        let envelope = Arc::new(envelope);
        let gate = BearerAuthGate::new(source, &config.permissions, &config.operations)?;

        tracing::info!(
            roles = config.permissions.roles.len(),
            operations = config.operations.len(),
            "keyward initialized"
        );

        Ok(Self {
            rotator: KeyRotator::new(store.clone(), envelope.clone(), config.keys.clone()),
            keyring: KeyRing::new(store.clone(), envelope.clone(), config.keys.source_cache()),
            short_codes: ShortCodeService::new(store.clone(), &envelope, config.short_codes.clone()),
            gate,
            config,
            store,
            envelope,
        })
    }

    pub fn config(&self) -> &KeywardConfig {
        &self.config
    }

    pub fn permissions(&self) -> &PermissionsConfig {
        &self.config.permissions
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Keys
    // ─────────────────────────────────────────────────────────────────────────

    pub fn rotator(&self) -> &KeyRotator<S> {
        &self.rotator
    }

    pub fn keyring(&self) -> &KeyRing<S> {
        &self.keyring
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Short codes
    // ─────────────────────────────────────────────────────────────────────────

    pub fn short_codes(&self) -> &ShortCodeService<S> {
        &self.short_codes
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Authorization
    // ─────────────────────────────────────────────────────────────────────────

    pub fn gate(&self) -> &BearerAuthGate<A> {
        &self.gate
    }

    /// Authenticate a bearer token and authorize it for `operation`.
    pub async fn authorize(&self, operation: &str, token: &str) -> Result<AuthContext> {
        Ok(self.gate.authorize(operation, token).await?)
    }
}
