//! In-memory implementation of the store traits.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence. Timestamps are
//! truncated to milliseconds on the way in, as SQLite stores them.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use keyward_core::{
    from_millis, to_millis, DeleteComment, Key, KeyId, KeyUsage, ShortCode, ShortCodeId,
    ShortCodeUsage,
};

use crate::error::{Result, StoreError};
use crate::traits::{
    cap_key_batch, InsertKey, InsertShortCode, KeyStore, ShortCodeStore, OVERRIDE_BACKDATE_SECS,
};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock; every
/// write runs under the write lock, which stands in for a transaction.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    keys: HashMap<KeyId, Key>,
    short_codes: HashMap<ShortCodeId, ShortCode>,
}

fn truncate(at: DateTime<Utc>) -> DateTime<Utc> {
    from_millis(to_millis(at))
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    /// Number of stored short codes, active or not.
    pub fn short_code_count(&self) -> Result<usize> {
        Ok(self.read()?.short_codes.len())
    }

    /// Raw lookup that bypasses the active projection.
    pub fn raw_short_code(&self, id: ShortCodeId) -> Result<Option<ShortCode>> {
        Ok(self.read()?.short_codes.get(&id).cloned())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyStore for MemoryStore {
    async fn insert_key(&self, key: InsertKey) -> Result<Key> {
        let mut inner = self.write()?;

        let stored = Key {
            id: key.id,
            private_material: key.private_material,
            public_material: key.public_material,
            usage: key.usage,
            created_at: truncate(key.now),
            expires_at: truncate(key.expires_at),
            deleted_at: None,
            deleted_comment: None,
        };
        inner.keys.insert(stored.id, stored.clone());

        Ok(stored)
    }

    async fn delete_key(&self, id: KeyId, now: DateTime<Utc>, comment: &str) -> Result<Key> {
        let mut inner = self.write()?;

        let key = inner
            .keys
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("key", id))?;
        key.deleted_at = Some(truncate(now));
        key.deleted_comment = Some(comment.to_string());

        Ok(key.clone())
    }

    async fn search_keys(&self, usage: KeyUsage) -> Result<Vec<Key>> {
        let now = Utc::now();
        let mut keys: Vec<Key> = {
            let inner = self.read()?;
            inner
                .keys
                .values()
                .filter(|k| k.usage == usage && k.is_active(now))
                .cloned()
                .collect()
        };

        keys.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.to_string().cmp(&a.id.to_string()))
        });

        Ok(cap_key_batch(usage, keys))
    }

    async fn select_key(&self, id: KeyId) -> Result<Key> {
        let inner = self.read()?;
        inner
            .keys
            .get(&id)
            .filter(|k| k.is_active(Utc::now()))
            .cloned()
            .ok_or_else(|| StoreError::not_found("key", id))
    }
}

#[async_trait]
impl ShortCodeStore for MemoryStore {
    async fn insert_short_code(&self, code: InsertShortCode) -> Result<ShortCode> {
        let mut inner = self.write()?;
        let now = Utc::now();

        let existing = inner
            .short_codes
            .values()
            .find(|sc| sc.target == code.target && sc.usage == code.usage && sc.is_active(now))
            .map(|sc| sc.id);

        if let Some(existing) = existing {
            if !code.override_existing {
                return Err(StoreError::AlreadyExists {
                    usage: code.usage.to_string(),
                });
            }

            if let Some(sc) = inner.short_codes.get_mut(&existing) {
                sc.deleted_at = Some(truncate(code.now - Duration::seconds(OVERRIDE_BACKDATE_SECS)));
                sc.deleted_comment = Some(DeleteComment::OverrideWithNewerKey.as_str().to_string());
            }
            tracing::debug!(usage = %code.usage, superseded = %existing, "short code overridden");
        }

        for sc in inner.short_codes.values_mut() {
            if sc.target == code.target
                && sc.usage == code.usage
                && sc.deleted_at.is_none()
                && sc.expires_at <= now
            {
                sc.deleted_at = Some(sc.expires_at);
            }
        }

        let stored = ShortCode {
            id: code.id,
            code: code.code,
            usage: code.usage,
            target: code.target,
            data: code.data,
            created_at: truncate(code.now),
            expires_at: truncate(code.expires_at),
            deleted_at: None,
            deleted_comment: None,
        };
        inner.short_codes.insert(stored.id, stored.clone());

        Ok(stored)
    }

    async fn select_short_code_by_params(
        &self,
        usage: ShortCodeUsage,
        target: &str,
    ) -> Result<ShortCode> {
        let inner = self.read()?;
        let now = Utc::now();

        inner
            .short_codes
            .values()
            .find(|sc| sc.usage == usage && sc.target == target && sc.is_active(now))
            .cloned()
            .ok_or_else(|| StoreError::not_found("short code", usage))
    }

    async fn delete_short_code(
        &self,
        id: ShortCodeId,
        now: DateTime<Utc>,
        comment: DeleteComment,
    ) -> Result<ShortCode> {
        let mut inner = self.write()?;

        let sc = inner
            .short_codes
            .get_mut(&id)
            .filter(|sc| sc.is_active(Utc::now()))
            .ok_or_else(|| StoreError::not_found("short code", id))?;
        sc.deleted_at = Some(truncate(now));
        sc.deleted_comment = Some(comment.as_str().to_string());

        Ok(sc.clone())
    }
}
