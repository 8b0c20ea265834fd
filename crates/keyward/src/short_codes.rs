//! Issuing and redeeming one-time short codes.
//!
//! The cleartext code leaves this module exactly once, in the
//! [`IssuedShortCode`] returned by [`ShortCodeService::create`]. The store
//! only ever sees a keyed BLAKE3 digest bound to the code's usage and target,
//! so a leaked row cannot be replayed and cannot be moved to another slot.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use keyward_core::{CoreError, DeleteComment, Envelope, ShortCode, ShortCodeId, ShortCodeUsage};
use keyward_store::{InsertShortCode, ShortCodeStore};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use tracing::instrument;

use crate::config::ShortCodesConfig;
use crate::error::{KeywardError, OperationContext, Result};

/// Context string for deriving the digest key from the master key.
const DIGEST_CONTEXT: &str = "keyward 2024-06-01 short code digest v1";

/// A freshly stored short code and its cleartext.
#[derive(Clone)]
pub struct IssuedShortCode {
    pub short_code: ShortCode,
    /// Deliver this to the target. It cannot be recovered later.
    pub plain_code: String,
}

impl fmt::Debug for IssuedShortCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedShortCode")
            .field("short_code", &self.short_code)
            .field("plain_code", &"<redacted>")
            .finish()
    }
}

/// Short-code issuance and redemption.
pub struct ShortCodeService<S> {
    store: Arc<S>,
    digest_key: [u8; 32],
    config: ShortCodesConfig,
}

impl<S> Clone for ShortCodeService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            digest_key: self.digest_key,
            config: self.config.clone(),
        }
    }
}

impl<S: ShortCodeStore> ShortCodeService<S> {
    pub fn new(store: Arc<S>, envelope: &Envelope, config: ShortCodesConfig) -> Self {
        Self {
            store,
            digest_key: envelope.secret().derive(DIGEST_CONTEXT),
            config,
        }
    }

    /// Issue a code with no payload.
    pub async fn create(
        &self,
        usage: ShortCodeUsage,
        target: &str,
        override_existing: bool,
        now: DateTime<Utc>,
    ) -> Result<IssuedShortCode> {
        self.issue(usage, target, None, override_existing, now).await
    }

    /// Issue a code carrying a JSON payload, read back with
    /// [`ShortCode::data_as`].
    pub async fn create_with_data<T: Serialize + ?Sized>(
        &self,
        usage: ShortCodeUsage,
        target: &str,
        data: &T,
        override_existing: bool,
        now: DateTime<Utc>,
    ) -> Result<IssuedShortCode> {
        let data = serde_json::to_vec(data)
            .map_err(|e| CoreError::EncodingError(format!("short code data: {}", e)))?;
        self.issue(usage, target, Some(data), override_existing, now).await
    }

    #[instrument(skip_all, fields(usage = %usage, override_existing = override_existing))]
    async fn issue(
        &self,
        usage: ShortCodeUsage,
        target: &str,
        data: Option<Vec<u8>>,
        override_existing: bool,
        now: DateTime<Utc>,
    ) -> Result<IssuedShortCode> {
        if target.is_empty() {
            return Err(KeywardError::InvalidInput("short code target is empty".into()));
        }

        let ttl = self.config.usage(usage)?.ttl();
        let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
            KeywardError::InvalidInput(format!("short code expiry out of range for {}", now))
        })?;

        let plain_code = self.generate_code();
        let short_code = self
            .store
            .insert_short_code(InsertShortCode {
                id: ShortCodeId::generate(),
                code: self.digest(usage, target, &plain_code).to_hex().to_string(),
                usage,
                target: target.to_string(),
                data,
                now,
                expires_at,
                override_existing,
            })
            .await
            .operation("insert_short_code")?;

        tracing::debug!(short_code_id = %short_code.id, "issued short code");
        Ok(IssuedShortCode {
            short_code,
            plain_code,
        })
    }

    /// Redeem a code.
    ///
    /// A wrong code leaves the active one in place. A correct code is
    /// consumed; presenting it again fails as not found.
    #[instrument(skip_all, fields(usage = %usage))]
    pub async fn consume(
        &self,
        usage: ShortCodeUsage,
        target: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<ShortCode> {
        let active = self
            .store
            .select_short_code_by_params(usage, target)
            .await
            .operation("select_short_code")?;

        let stored = blake3::Hash::from_hex(&active.code)
            .map_err(|e| CoreError::DecodingError(format!("short code digest: {}", e)))?;
        // blake3::Hash equality is constant time.
        if stored != self.digest(usage, target, code) {
            tracing::warn!(short_code_id = %active.id, "short code mismatch");
            return Err(KeywardError::InvalidShortCode);
        }

        self.store
            .delete_short_code(active.id, now, DeleteComment::KeyConsumed)
            .await
            .operation("delete_short_code")
    }

    fn generate_code(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.config.size)
            .map(char::from)
            .collect()
    }

    fn digest(&self, usage: ShortCodeUsage, target: &str, code: &str) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new_keyed(&self.digest_key);
        for part in [usage.as_str(), target, code] {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        hasher.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use keyward_core::MasterKey;
    use keyward_store::MemoryStore;
    use serde::Deserialize;

    fn service(store: Arc<MemoryStore>) -> ShortCodeService<MemoryStore> {
        ShortCodeService::new(
            store,
            &Envelope::new(MasterKey::generate()),
            ShortCodesConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_issue_then_consume_once() {
        let store = Arc::new(MemoryStore::new());
        let service = service(store.clone());
        let now = Utc::now();

        let issued = service
            .create(ShortCodeUsage::ValidateMail, "a@x.com", false, now)
            .await
            .unwrap();
        assert_eq!(issued.plain_code.len(), 32);
        assert!(issued.plain_code.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(issued.short_code.code, issued.plain_code);

        let consumed = service
            .consume(ShortCodeUsage::ValidateMail, "a@x.com", &issued.plain_code, now)
            .await
            .unwrap();
        assert_eq!(consumed.id, issued.short_code.id);
        assert_eq!(consumed.delete_reason(), Some(DeleteComment::KeyConsumed));

        let replay = service
            .consume(ShortCodeUsage::ValidateMail, "a@x.com", &issued.plain_code, now)
            .await
            .unwrap_err();
        assert_eq!(replay.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_wrong_code_keeps_active_code() {
        let store = Arc::new(MemoryStore::new());
        let service = service(store.clone());
        let now = Utc::now();

        let issued = service
            .create(ShortCodeUsage::ResetPassword, "a@x.com", false, now)
            .await
            .unwrap();

        let err = service
            .consume(ShortCodeUsage::ResetPassword, "a@x.com", "not-the-code", now)
            .await
            .unwrap_err();
        assert!(matches!(err, KeywardError::InvalidShortCode));
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        service
            .consume(ShortCodeUsage::ResetPassword, "a@x.com", &issued.plain_code, now)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_code_is_bound_to_its_slot() {
        let store = Arc::new(MemoryStore::new());
        let service = service(store.clone());
        let now = Utc::now();

        let a = service
            .create(ShortCodeUsage::ValidateMail, "a@x.com", false, now)
            .await
            .unwrap();
        service
            .create(ShortCodeUsage::ResetPassword, "a@x.com", false, now)
            .await
            .unwrap();

        // Same target, other usage: the cleartext does not transfer.
        let err = service
            .consume(ShortCodeUsage::ResetPassword, "a@x.com", &a.plain_code, now)
            .await
            .unwrap_err();
        assert!(matches!(err, KeywardError::InvalidShortCode));
    }

    #[tokio::test]
    async fn test_second_issue_needs_override() {
        let store = Arc::new(MemoryStore::new());
        let service = service(store.clone());
        let now = Utc::now();

        let first = service
            .create(ShortCodeUsage::RequestRegister, "a@x.com", false, now)
            .await
            .unwrap();

        let err = service
            .create(ShortCodeUsage::RequestRegister, "a@x.com", false, now)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let second = service
            .create(ShortCodeUsage::RequestRegister, "a@x.com", true, now)
            .await
            .unwrap();

        let err = service
            .consume(ShortCodeUsage::RequestRegister, "a@x.com", &first.plain_code, now)
            .await
            .unwrap_err();
        assert!(matches!(err, KeywardError::InvalidShortCode));

        service
            .consume(ShortCodeUsage::RequestRegister, "a@x.com", &second.plain_code, now)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_payload_round_trips() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Registration {
            email: String,
            invited_by: String,
        }

        let store = Arc::new(MemoryStore::new());
        let service = service(store.clone());
        let now = Utc::now();
        let payload = Registration {
            email: "a@x.com".into(),
            invited_by: "b@x.com".into(),
        };

        let issued = service
            .create_with_data(ShortCodeUsage::RequestRegister, "a@x.com", &payload, false, now)
            .await
            .unwrap();
        let consumed = service
            .consume(ShortCodeUsage::RequestRegister, "a@x.com", &issued.plain_code, now)
            .await
            .unwrap();

        assert_eq!(consumed.data_as::<Registration>().unwrap(), Some(payload));
    }

    #[tokio::test]
    async fn test_empty_target_is_invalid_input() {
        let service = service(Arc::new(MemoryStore::new()));
        let err = service
            .create(ShortCodeUsage::ValidateMail, "", false, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_debug_redacts_cleartext() {
        let now = Utc::now();
        let issued = IssuedShortCode {
            short_code: ShortCode {
                id: ShortCodeId::generate(),
                code: "digest".into(),
                usage: ShortCodeUsage::ValidateMail,
                target: "a@x.com".into(),
                data: None,
                created_at: now,
                expires_at: now,
                deleted_at: None,
                deleted_comment: None,
            },
            plain_code: "s3cr3tcode".into(),
        };

        assert!(!format!("{:?}", issued).contains("s3cr3tcode"));
    }
}
