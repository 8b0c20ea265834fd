//! Store traits: the abstract interface for key and short-code persistence.
//!
//! Implementations include SQLite (primary) and in-memory (for tests). Both
//! expose the same two read paths: raw rows for administrative writes and
//! an "active" projection for everything else.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keyward_core::{
    DeleteComment, Key, KeyId, KeyUsage, ShortCode, ShortCodeId, ShortCodeUsage, MAX_BATCH_SIZE,
};

use crate::error::Result;

/// Parameters for inserting a key.
#[derive(Debug, Clone)]
pub struct InsertKey {
    pub id: KeyId,
    /// Already envelope-encrypted and encoded.
    pub private_material: String,
    pub public_material: Option<String>,
    pub usage: KeyUsage,
    pub now: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Parameters for inserting a short code.
#[derive(Debug, Clone)]
pub struct InsertShortCode {
    pub id: ShortCodeId,
    /// Digest of the cleartext code, never the cleartext itself.
    pub code: String,
    pub usage: ShortCodeUsage,
    pub target: String,
    pub data: Option<Vec<u8>>,
    pub now: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Supersede an active code for the same target and usage instead of
    /// failing with `AlreadyExists`.
    pub override_existing: bool,
}

/// Key registry.
///
/// Deletion here is an administrative annotation: it may be repeated, and it
/// does not remove the key from [`search_keys`](KeyStore::search_keys) or
/// [`select_key`](KeyStore::select_key). Consumers check `deleted_at`
/// themselves.
#[async_trait]
pub trait KeyStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a new key. Identifiers are random; collisions are not handled.
    async fn insert_key(&self, key: InsertKey) -> Result<Key>;

    /// Soft-delete a key, overwriting any previous deletion.
    ///
    /// `NotFound` only if no row with this id exists at all.
    async fn delete_key(&self, id: KeyId, now: DateTime<Utc>, comment: &str) -> Result<Key>;

    // ─────────────────────────────────────────────────────────────────────────
    // Reads (unexpired keys only)
    // ─────────────────────────────────────────────────────────────────────────

    /// Unexpired keys of a usage, newest first, at most [`MAX_BATCH_SIZE`].
    async fn search_keys(&self, usage: KeyUsage) -> Result<Vec<Key>>;

    /// An unexpired key by id.
    async fn select_key(&self, id: KeyId) -> Result<Key>;
}

/// Short-code broker.
///
/// At most one active code exists per `(target, usage)`, and an active code
/// can be deleted exactly once.
#[async_trait]
pub trait ShortCodeStore: Send + Sync {
    /// Insert a short code inside a single transaction.
    ///
    /// Without override, an existing active code for the same target and
    /// usage fails the insert with `AlreadyExists`. With override, that code
    /// is deleted first, backdated by one second and commented
    /// [`DeleteComment::OverrideWithNewerKey`].
    async fn insert_short_code(&self, code: InsertShortCode) -> Result<ShortCode>;

    /// The active code for a target and usage.
    async fn select_short_code_by_params(
        &self,
        usage: ShortCodeUsage,
        target: &str,
    ) -> Result<ShortCode>;

    /// Delete an active code. A code that is already deleted or expired
    /// reports `NotFound`, so this succeeds at most once per code.
    async fn delete_short_code(
        &self,
        id: ShortCodeId,
        now: DateTime<Utc>,
        comment: DeleteComment,
    ) -> Result<ShortCode>;
}

/// Both stores behind one handle.
pub trait Store: KeyStore + ShortCodeStore {}

impl<S: KeyStore + ShortCodeStore + ?Sized> Store for S {}

/// Seconds an overridden short code is backdated by, so it is already
/// outside the active projection when the replacement becomes visible.
pub const OVERRIDE_BACKDATE_SECS: i64 = 1;

/// Cap a newest-first key batch at [`MAX_BATCH_SIZE`].
///
/// More active keys than the cap means rotation is misbehaving. That is
/// reported once and the batch is truncated; the caller never sees an error.
pub(crate) fn cap_key_batch(usage: KeyUsage, mut keys: Vec<Key>) -> Vec<Key> {
    if keys.len() > MAX_BATCH_SIZE {
        tracing::error!(
            operation = "search_keys",
            usage = %usage,
            max_batch_size = MAX_BATCH_SIZE,
            "too many active keys for usage, truncating batch"
        );
        keys.truncate(MAX_BATCH_SIZE);
    }
    keys
}
