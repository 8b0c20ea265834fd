//! Sign with the newest key, verify with any active one.
//!
//! Key sets are cached per usage for a configured time to live. A rotation
//! becomes visible once the cached set expires, or right away after
//! [`KeyRing::invalidate`].

use std::sync::Arc;
use std::time::Duration;

use keyward_core::{Envelope, Jwk, Key, KeyId, KeyUsage};
use keyward_store::{KeyStore, StoreError};
use moka::future::Cache;
use tracing::instrument;

use crate::error::{KeywardError, OperationContext, Result};

/// Read access to the key registry in JWK form.
pub struct KeyRing<S> {
    store: Arc<S>,
    envelope: Arc<Envelope>,
    cache: Option<KeyCache>,
}

// Failed loads are never inserted, so a bad master key is retried each call.
#[derive(Clone)]
struct KeyCache {
    signing: Cache<KeyUsage, Jwk>,
    verification: Cache<KeyUsage, Arc<Vec<Jwk>>>,
}

impl KeyCache {
    fn new(ttl: Duration) -> Self {
        let capacity = KeyUsage::ALL.len() as u64;
        Self {
            signing: Cache::builder().time_to_live(ttl).max_capacity(capacity).build(),
            verification: Cache::builder().time_to_live(ttl).max_capacity(capacity).build(),
        }
    }
}

impl<S> Clone for KeyRing<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            envelope: Arc::clone(&self.envelope),
            cache: self.cache.clone(),
        }
    }
}

impl<S: KeyStore> KeyRing<S> {
    /// A zero `cache_ttl` disables caching.
    pub fn new(store: Arc<S>, envelope: Arc<Envelope>, cache_ttl: Duration) -> Self {
        Self {
            store,
            envelope,
            cache: (!cache_ttl.is_zero()).then(|| KeyCache::new(cache_ttl)),
        }
    }

    /// The private JWK of the newest usable key.
    #[instrument(skip_all, fields(usage = %usage))]
    pub async fn signing_key(&self, usage: KeyUsage) -> Result<Jwk> {
        if let Some(cache) = &self.cache {
            if let Some(jwk) = cache.signing.get(&usage).await {
                tracing::debug!("signing key cache hit");
                return Ok(jwk);
            }
        }

        let keys = self.usable(usage).await?;
        let newest = keys.first().ok_or(KeywardError::NoActiveKey(usage))?;
        let jwk = newest.consume(&self.envelope, true)?;

        if let Some(cache) = &self.cache {
            cache.signing.insert(usage, jwk.clone()).await;
        }
        Ok(jwk)
    }

    /// Public JWKs of every usable asymmetric key, newest first.
    pub async fn verification_keys(&self, usage: KeyUsage) -> Result<Vec<Jwk>> {
        if let Some(cache) = &self.cache {
            if let Some(jwks) = cache.verification.get(&usage).await {
                return Ok(jwks.as_ref().clone());
            }
        }

        let jwks = self
            .usable(usage)
            .await?
            .iter()
            .filter(|key| !key.is_symmetric())
            .map(|key| key.consume(&self.envelope, false).map_err(KeywardError::from))
            .collect::<Result<Vec<_>>>()?;

        if let Some(cache) = &self.cache {
            cache.verification.insert(usage, Arc::new(jwks.clone())).await;
        }
        Ok(jwks)
    }

    /// The public JWK of one key.
    ///
    /// Expired, soft-deleted and symmetric keys all resolve as not found.
    /// Never cached: a revoked key stops resolving immediately.
    pub async fn public_key(&self, id: KeyId) -> Result<Jwk> {
        let key = self.store.select_key(id).await.operation("select_key")?;
        if key.is_deleted() || key.is_symmetric() {
            return Err(StoreError::NotFound {
                entity: "key",
                key: id.to_string(),
            }
            .into());
        }
        Ok(key.consume(&self.envelope, false)?)
    }

    /// Drop the cached key sets of one usage.
    pub async fn invalidate(&self, usage: KeyUsage) {
        if let Some(cache) = &self.cache {
            cache.signing.invalidate(&usage).await;
            cache.verification.invalidate(&usage).await;
        }
    }

    async fn usable(&self, usage: KeyUsage) -> Result<Vec<Key>> {
        let mut keys = self.store.search_keys(usage).await.operation("search_keys")?;
        keys.retain(|key| !key.is_deleted());
        Ok(keys)
    }
}
