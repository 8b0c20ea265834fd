//! Key rotation.
//!
//! Rotation only ever adds keys. Older keys stay in the registry until they
//! expire, so tokens signed with them keep verifying for their lifetime.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use keyward_core::{
    encode_private_material, encode_public_material, generate_ed25519, Envelope, KeyId, KeyUsage,
};
use keyward_store::{InsertKey, KeyStore};
use tracing::instrument;

use crate::config::KeysConfig;
use crate::error::{KeywardError, OperationContext, Result};

/// What a rotation pass did for one usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationOutcome {
    /// The newest key is younger than the rotation interval.
    Kept(KeyId),
    /// A fresh key was generated and stored.
    Generated(KeyId),
}

impl RotationOutcome {
    pub fn key_id(&self) -> KeyId {
        match self {
            RotationOutcome::Kept(id) | RotationOutcome::Generated(id) => *id,
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, RotationOutcome::Generated(_))
    }
}

/// Generates signing keys as they age out.
pub struct KeyRotator<S> {
    store: Arc<S>,
    envelope: Arc<Envelope>,
    config: KeysConfig,
}

impl<S> Clone for KeyRotator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            envelope: Arc::clone(&self.envelope),
            config: self.config.clone(),
        }
    }
}

impl<S: KeyStore> KeyRotator<S> {
    pub fn new(store: Arc<S>, envelope: Arc<Envelope>, config: KeysConfig) -> Self {
        Self {
            store,
            envelope,
            config,
        }
    }

    /// Rotate one usage.
    ///
    /// The newest usable key is kept while it is younger than the configured
    /// rotation interval. Soft-deleted keys are not usable and never count.
    #[instrument(skip_all, fields(usage = %usage))]
    pub async fn rotate(&self, usage: KeyUsage, now: DateTime<Utc>) -> Result<RotationOutcome> {
        let config = self.config.usage(usage)?;

        let keys = self.store.search_keys(usage).await.operation("search_keys")?;
        if let Some(newest) = keys.iter().find(|key| !key.is_deleted()) {
            if now.signed_duration_since(newest.created_at) < config.rotation() {
                return Ok(RotationOutcome::Kept(newest.id));
            }
        }

        let expires_at = now.checked_add_signed(config.ttl()).ok_or_else(|| {
            KeywardError::InvalidInput(format!("key expiry out of range for {}", now))
        })?;

        let id = KeyId::generate();
        let (private, public) = generate_ed25519(id, usage);

        let key = self
            .store
            .insert_key(InsertKey {
                id,
                private_material: encode_private_material(&self.envelope, &private)?,
                public_material: Some(encode_public_material(&public)?),
                usage,
                now,
                expires_at,
            })
            .await
            .operation("insert_key")?;

        tracing::info!(key_id = %key.id, expires_at = %key.expires_at, "generated key");
        Ok(RotationOutcome::Generated(key.id))
    }

    /// Rotate every configured usage.
    ///
    /// A failing usage is logged and does not stop the others.
    pub async fn rotate_all(&self, now: DateTime<Utc>) -> Vec<(KeyUsage, Result<RotationOutcome>)> {
        let mut outcomes = Vec::with_capacity(self.config.usages.len());
        for &usage in self.config.usages.keys() {
            let outcome = self.rotate(usage, now).await;
            if let Err(e) = &outcome {
                tracing::error!(usage = %usage, error = %e, "key rotation failed");
            }
            outcomes.push((usage, outcome));
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyUsageConfig;
    use chrono::Duration;
    use keyward_core::MasterKey;
    use keyward_store::MemoryStore;

    fn rotator(store: Arc<MemoryStore>) -> KeyRotator<MemoryStore> {
        KeyRotator::new(
            store,
            Arc::new(Envelope::new(MasterKey::generate())),
            KeysConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_first_rotation_generates() {
        let store = Arc::new(MemoryStore::new());
        let rotator = rotator(store.clone());
        let now = Utc::now();

        let outcome = rotator.rotate(KeyUsage::Auth, now).await.unwrap();
        assert!(outcome.is_generated());

        let keys = store.search_keys(KeyUsage::Auth).await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].id, outcome.key_id());
        assert!(!keys[0].is_symmetric());
        assert_eq!(
            keys[0].expires_at.timestamp_millis(),
            (now + Duration::days(7)).timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_young_key_is_kept() {
        let store = Arc::new(MemoryStore::new());
        let rotator = rotator(store.clone());
        let now = Utc::now();

        let first = rotator.rotate(KeyUsage::Auth, now).await.unwrap();
        let second = rotator
            .rotate(KeyUsage::Auth, now + Duration::hours(23))
            .await
            .unwrap();

        assert_eq!(second, RotationOutcome::Kept(first.key_id()));
        assert_eq!(store.search_keys(KeyUsage::Auth).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_old_key_is_rotated_but_kept_for_verification() {
        let store = Arc::new(MemoryStore::new());
        let rotator = rotator(store.clone());
        let now = Utc::now();

        let first = rotator.rotate(KeyUsage::Auth, now).await.unwrap();
        let second = rotator
            .rotate(KeyUsage::Auth, now + Duration::days(1))
            .await
            .unwrap();

        assert!(second.is_generated());
        assert_ne!(first.key_id(), second.key_id());

        let keys = store.search_keys(KeyUsage::Auth).await.unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].id, second.key_id());
    }

    #[tokio::test]
    async fn test_deleted_newest_key_forces_rotation() {
        let store = Arc::new(MemoryStore::new());
        let rotator = rotator(store.clone());
        let now = Utc::now();

        let first = rotator.rotate(KeyUsage::Refresh, now).await.unwrap();
        store
            .delete_key(first.key_id(), now, "compromised")
            .await
            .unwrap();

        let second = rotator.rotate(KeyUsage::Refresh, now).await.unwrap();
        assert!(second.is_generated());
    }

    #[tokio::test]
    async fn test_rotate_all_reports_each_usage() {
        let store = Arc::new(MemoryStore::new());
        let rotator = rotator(store.clone());

        let outcomes = rotator.rotate_all(Utc::now()).await;
        let usages: Vec<KeyUsage> = outcomes.iter().map(|(usage, _)| *usage).collect();
        assert_eq!(usages, vec![KeyUsage::Auth, KeyUsage::Refresh]);
        assert!(outcomes.iter().all(|(_, o)| o.as_ref().unwrap().is_generated()));
    }

    #[tokio::test]
    async fn test_unconfigured_usage_is_a_configuration_error() {
        let store = Arc::new(MemoryStore::new());
        let mut config = KeysConfig::default();
        config.usages.remove(&KeyUsage::Refresh);
        config.usages.insert(
            KeyUsage::Auth,
            KeyUsageConfig {
                ttl_secs: 120,
                rotation_secs: 60,
            },
        );
        let rotator = KeyRotator::new(store, Arc::new(Envelope::new(MasterKey::generate())), config);

        let err = rotator.rotate(KeyUsage::Refresh, Utc::now()).await.unwrap_err();
        assert!(matches!(err, KeywardError::Config(_)));
        assert_eq!(rotator.rotate_all(Utc::now()).await.len(), 1);
    }
}
