//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keyward_core::{
    encode_private_material, encode_public_material, generate_ed25519, AccessTokenClaims,
    Envelope, Key, KeyId, KeyUsage, MasterKey, Role,
};
use keyward_perms::{AuthenticateSource, BoxError};
use keyward_store::{InsertKey, KeyStore, MemoryStore, Result as StoreResult};
use uuid::Uuid;

/// A test fixture with an envelope and a memory store.
pub struct TestFixture {
    pub envelope: Arc<Envelope>,
    pub store: Arc<MemoryStore>,
}

impl TestFixture {
    /// Create a new test fixture with a random master key.
    pub fn new() -> Self {
        Self::with_master_key(MasterKey::generate())
    }

    /// Create with a fixed master key.
    pub fn with_master_key(key: MasterKey) -> Self {
        Self {
            envelope: Arc::new(Envelope::new(key)),
            store: Arc::new(MemoryStore::new()),
        }
    }

    /// Generate an Ed25519 key and store it directly, bypassing rotation.
    pub async fn insert_key(
        &self,
        usage: KeyUsage,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<Key> {
        let id = KeyId::generate();
        let (private, public) = generate_ed25519(id, usage);
        self.store
            .insert_key(InsertKey {
                id,
                private_material: encode_private_material(&self.envelope, &private)?,
                public_material: Some(encode_public_material(&public)?),
                usage,
                now: created_at,
                expires_at,
            })
            .await
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Claims for a signed-in user holding `roles`.
pub fn user_claims<R: Into<Role>>(roles: impl IntoIterator<Item = R>) -> AccessTokenClaims {
    AccessTokenClaims::user(Uuid::new_v4(), roles.into_iter().map(Into::into))
}

/// An [`AuthenticateSource`] backed by a fixed token table.
///
/// Unknown tokens fail authentication. Every call is counted, including
/// failed ones.
#[derive(Default)]
pub struct ScriptedSource {
    tokens: RwLock<HashMap<String, AccessTokenClaims>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as `claims`.
    pub fn with_token(self, token: impl Into<String>, claims: AccessTokenClaims) -> Self {
        self.insert(token, claims);
        self
    }

    pub fn insert(&self, token: impl Into<String>, claims: AccessTokenClaims) {
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.insert(token.into(), claims);
        }
    }

    /// Stop accepting `token`.
    pub fn revoke(&self, token: &str) {
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.remove(token);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthenticateSource for ScriptedSource {
    async fn authenticate(&self, token: &str) -> Result<AccessTokenClaims, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let tokens = self.tokens.read().map_err(|e| e.to_string())?;
        tokens
            .get(token)
            .cloned()
            .ok_or_else(|| "unknown or expired token".into())
    }
}
