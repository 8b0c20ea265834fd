//! SQLite implementation of the store traits.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use keyward_core::{
    from_millis, to_millis, DeleteComment, Key, KeyId, KeyUsage, ShortCode, ShortCodeId,
    ShortCodeUsage, MAX_BATCH_SIZE,
};

use crate::error::{Result, StoreError};
use crate::migration::{self, DB_NOW_MS};
use crate::traits::{
    cap_key_batch, InsertKey, InsertShortCode, KeyStore, ShortCodeStore, OVERRIDE_BACKDATE_SECS,
};

const KEY_COLUMNS: &str =
    "id, private_material, public_material, usage, created_at, expires_at, deleted_at, deleted_comment";

const SHORT_CODE_COLUMNS: &str =
    "id, code, usage, target, data, created_at, expires_at, deleted_at, deleted_comment";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
#[derive(Clone)]
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.run_cancellable(move |conn, _| f(conn)).await
    }

    /// Run a blocking operation that observes its caller going away.
    ///
    /// `spawn_blocking` keeps running after the awaiting future is dropped.
    /// The drop flips the [`Cancellation`] instead: an operation that has not
    /// reached the connection yet never starts, and a transaction that calls
    /// [`Cancellation::check`] before committing rolls back.
    async fn run_cancellable<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection, &Cancellation) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        let cancellation = Cancellation::default();
        let mut guard = CancelOnDrop(Some(cancellation.clone()));

        let joined = tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
            cancellation.check()?;
            f(&mut conn, &cancellation)
        })
        .await;

        guard.disarm();
        joined.map_err(|e| StoreError::Task(e.to_string()))?
    }
}

/// Set once the future waiting on a blocking operation has been dropped.
#[derive(Clone, Default)]
struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    fn check(&self) -> Result<()> {
        if self.0.load(Ordering::SeqCst) {
            Err(StoreError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// Cancels unless disarmed once the blocking work has returned.
struct CancelOnDrop(Option<Cancellation>);

impl CancelOnDrop {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(cancellation) = self.0.take() {
            cancellation.0.store(true, Ordering::SeqCst);
        }
    }
}

// Parse a text column through FromStr.
fn parse_column<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn millis_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    row.get::<_, i64>(idx).map(from_millis)
}

fn optional_millis_column(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(row.get::<_, Option<i64>>(idx)?.map(from_millis))
}

// Expects KEY_COLUMNS order.
fn row_to_key(row: &rusqlite::Row<'_>) -> rusqlite::Result<Key> {
    Ok(Key {
        id: parse_column::<KeyId>(row, 0)?,
        private_material: row.get(1)?,
        public_material: row.get(2)?,
        usage: parse_column::<KeyUsage>(row, 3)?,
        created_at: millis_column(row, 4)?,
        expires_at: millis_column(row, 5)?,
        deleted_at: optional_millis_column(row, 6)?,
        deleted_comment: row.get(7)?,
    })
}

// Expects SHORT_CODE_COLUMNS order.
fn row_to_short_code(row: &rusqlite::Row<'_>) -> rusqlite::Result<ShortCode> {
    Ok(ShortCode {
        id: parse_column::<ShortCodeId>(row, 0)?,
        code: row.get(1)?,
        usage: parse_column::<ShortCodeUsage>(row, 2)?,
        target: row.get(3)?,
        data: row.get(4)?,
        created_at: millis_column(row, 5)?,
        expires_at: millis_column(row, 6)?,
        deleted_at: optional_millis_column(row, 7)?,
        deleted_comment: row.get(8)?,
    })
}

// The partial unique index is the last line of defence against two open
// codes in one slot.
fn map_insert_short_code_error(e: rusqlite::Error, usage: ShortCodeUsage) -> StoreError {
    match e {
        rusqlite::Error::SqliteFailure(ref err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            StoreError::AlreadyExists {
                usage: usage.to_string(),
            }
        }
        other => StoreError::Database(other),
    }
}

#[async_trait]
impl KeyStore for SqliteStore {
    async fn insert_key(&self, key: InsertKey) -> Result<Key> {
        self.run(move |conn| {
            let inserted = conn.query_row(
                &format!(
                    "INSERT INTO keys (id, private_material, public_material, usage, created_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     RETURNING {}",
                    KEY_COLUMNS
                ),
                params![
                    key.id.to_string(),
                    key.private_material,
                    key.public_material,
                    key.usage.as_str(),
                    to_millis(key.now),
                    to_millis(key.expires_at),
                ],
                row_to_key,
            )?;
            Ok(inserted)
        })
        .await
    }

    async fn delete_key(&self, id: KeyId, now: DateTime<Utc>, comment: &str) -> Result<Key> {
        let comment = comment.to_string();

        self.run(move |conn| {
            conn.query_row(
                &format!(
                    "UPDATE keys SET deleted_at = ?1, deleted_comment = ?2
                     WHERE id = ?3
                     RETURNING {}",
                    KEY_COLUMNS
                ),
                params![to_millis(now), comment, id.to_string()],
                row_to_key,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("key", id))
        })
        .await
    }

    async fn search_keys(&self, usage: KeyUsage) -> Result<Vec<Key>> {
        // One extra row tells us the cap was exceeded.
        let keys = self
            .run(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM active_keys
                     WHERE usage = ?1
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?2",
                    KEY_COLUMNS
                ))?;
                let keys = stmt
                    .query_map(
                        params![usage.as_str(), (MAX_BATCH_SIZE + 1) as i64],
                        row_to_key,
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(keys)
            })
            .await?;

        Ok(cap_key_batch(usage, keys))
    }

    async fn select_key(&self, id: KeyId) -> Result<Key> {
        self.run(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM active_keys WHERE id = ?1", KEY_COLUMNS),
                params![id.to_string()],
                row_to_key,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("key", id))
        })
        .await
    }
}

#[async_trait]
impl ShortCodeStore for SqliteStore {
    async fn insert_short_code(&self, code: InsertShortCode) -> Result<ShortCode> {
        let usage = code.usage;

        self.run_cancellable(move |conn, cancellation| {
            // IMMEDIATE takes the write lock up front: no other writer can
            // slip in between the check and the insert.
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM active_short_codes WHERE target = ?1 AND usage = ?2",
                    params![code.target, usage.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing) = existing {
                if !code.override_existing {
                    return Err(StoreError::AlreadyExists {
                        usage: usage.to_string(),
                    });
                }

                let backdated = code.now - Duration::seconds(OVERRIDE_BACKDATE_SECS);
                tx.execute(
                    "UPDATE short_codes SET deleted_at = ?1, deleted_comment = ?2
                     WHERE id IN (SELECT id FROM active_short_codes WHERE target = ?3 AND usage = ?4)",
                    params![
                        to_millis(backdated),
                        DeleteComment::OverrideWithNewerKey.as_str(),
                        code.target,
                        usage.as_str(),
                    ],
                )?;
                tracing::debug!(usage = %usage, superseded = %existing, "short code overridden");
            }

            // Expired rows are still open as far as the unique index is
            // concerned. Close them at their expiry time.
            tx.execute(
                &format!(
                    "UPDATE short_codes SET deleted_at = expires_at
                     WHERE target = ?1 AND usage = ?2 AND deleted_at IS NULL AND expires_at <= {}",
                    DB_NOW_MS
                ),
                params![code.target, usage.as_str()],
            )?;

            let inserted = tx
                .query_row(
                    &format!(
                        "INSERT INTO short_codes (id, code, usage, target, data, created_at, expires_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                         RETURNING {}",
                        SHORT_CODE_COLUMNS
                    ),
                    params![
                        code.id.to_string(),
                        code.code,
                        usage.as_str(),
                        code.target,
                        code.data,
                        to_millis(code.now),
                        to_millis(code.expires_at),
                    ],
                    row_to_short_code,
                )
                .map_err(|e| map_insert_short_code_error(e, usage))?;

            // Nobody is left to receive the code. Dropping `tx` rolls back.
            if let Err(e) = cancellation.check() {
                tracing::debug!(usage = %usage, "short code insert cancelled");
                return Err(e);
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
    }

    async fn select_short_code_by_params(
        &self,
        usage: ShortCodeUsage,
        target: &str,
    ) -> Result<ShortCode> {
        let target = target.to_string();

        self.run(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM active_short_codes WHERE usage = ?1 AND target = ?2",
                    SHORT_CODE_COLUMNS
                ),
                params![usage.as_str(), target],
                row_to_short_code,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("short code", usage))
        })
        .await
    }

    async fn delete_short_code(
        &self,
        id: ShortCodeId,
        now: DateTime<Utc>,
        comment: DeleteComment,
    ) -> Result<ShortCode> {
        self.run(move |conn| {
            conn.query_row(
                &format!(
                    "UPDATE short_codes SET deleted_at = ?1, deleted_comment = ?2
                     WHERE id IN (SELECT id FROM active_short_codes WHERE id = ?3)
                     RETURNING {}",
                    SHORT_CODE_COLUMNS
                ),
                params![to_millis(now), comment.as_str(), id.to_string()],
                row_to_short_code,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("short code", id))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, insert_key_params, short_code_params};

    #[tokio::test]
    async fn test_short_code_uniqueness() {
        let store = SqliteStore::open_memory().unwrap();
        test_support::short_code_uniqueness(&store).await;
    }

    #[tokio::test]
    async fn test_short_code_override() {
        let store = SqliteStore::open_memory().unwrap();
        test_support::short_code_override(&store).await;
    }

    #[tokio::test]
    async fn test_short_code_exactly_once_delete() {
        let store = SqliteStore::open_memory().unwrap();
        test_support::short_code_exactly_once_delete(&store).await;
    }

    #[tokio::test]
    async fn test_expired_short_code_is_inert() {
        let store = SqliteStore::open_memory().unwrap();
        test_support::expired_short_code_is_inert(&store).await;
    }

    #[tokio::test]
    async fn test_short_code_slots_are_independent() {
        let store = SqliteStore::open_memory().unwrap();
        test_support::short_code_slots_are_independent(&store).await;
    }

    #[tokio::test]
    async fn test_key_search_newest_first_and_excludes_expired() {
        let store = SqliteStore::open_memory().unwrap();
        test_support::key_search_newest_first(&store).await;
    }

    #[tokio::test]
    async fn test_key_delete_is_repeatable() {
        let store = SqliteStore::open_memory().unwrap();
        test_support::key_delete_is_repeatable(&store).await;
    }

    #[tokio::test]
    async fn test_key_batch_is_capped_and_logged_once() {
        let store = SqliteStore::open_memory().unwrap();
        test_support::key_batch_is_capped(&store).await;
    }

    #[tokio::test]
    async fn test_select_key_excludes_expired() {
        let store = SqliteStore::open_memory().unwrap();
        let now = Utc::now();

        let expired = store
            .insert_key(insert_key_params(
                KeyUsage::Auth,
                now - Duration::hours(2),
                now - Duration::hours(1),
            ))
            .await
            .unwrap();

        let err = store.select_key(expired.id).await.unwrap_err();
        assert!(err.is_not_found());

        // Still deletable: key deletion ignores expiry.
        let deleted = store.delete_key(expired.id, now, "cleanup").await.unwrap();
        assert_eq!(deleted.deleted_comment.as_deref(), Some("cleanup"));
    }

    #[tokio::test]
    async fn test_override_backdates_deletion() {
        let store = SqliteStore::open_memory().unwrap();
        let now = Utc::now();

        let first = store
            .insert_short_code(short_code_params("u@x.com", ShortCodeUsage::ResetPassword, now, false))
            .await
            .unwrap();
        store
            .insert_short_code(short_code_params("u@x.com", ShortCodeUsage::ResetPassword, now, true))
            .await
            .unwrap();

        let (deleted_at, comment): (i64, String) = store
            .run(move |conn| {
                Ok(conn.query_row(
                    "SELECT deleted_at, deleted_comment FROM short_codes WHERE id = ?1",
                    params![first.id.to_string()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(deleted_at, to_millis(now) - 1_000);
        assert_eq!(comment, "override with newer key");
    }

    #[tokio::test]
    async fn test_unique_index_rejects_second_open_row() {
        let store = SqliteStore::open_memory().unwrap();
        let now = Utc::now();

        store
            .insert_short_code(short_code_params("u@x.com", ShortCodeUsage::ValidateMail, now, false))
            .await
            .unwrap();

        // Bypass the application check entirely.
        let result = store
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO short_codes (id, code, usage, target, created_at, expires_at)
                     VALUES (?1, 'x', 'validateMail', 'u@x.com', ?2, ?3)",
                    params![
                        ShortCodeId::generate().to_string(),
                        to_millis(now),
                        to_millis(now + Duration::hours(1)),
                    ],
                )
                .map_err(|e| map_insert_short_code_error(e, ShortCodeUsage::ValidateMail))
            })
            .await;

        assert!(result.unwrap_err().is_already_exists());
    }

    #[tokio::test]
    async fn test_expired_row_is_sealed_at_expiry() {
        let store = SqliteStore::open_memory().unwrap();
        let now = Utc::now();
        let expires_at = now - Duration::minutes(5);

        let mut stale = short_code_params("u@x.com", ShortCodeUsage::ResetPassword, now, false);
        stale.now = now - Duration::hours(1);
        stale.expires_at = expires_at;
        let stale = store.insert_short_code(stale).await.unwrap();

        store
            .insert_short_code(short_code_params("u@x.com", ShortCodeUsage::ResetPassword, now, false))
            .await
            .unwrap();

        let (deleted_at, comment): (Option<i64>, Option<String>) = store
            .run(move |conn| {
                Ok(conn.query_row(
                    "SELECT deleted_at, deleted_comment FROM short_codes WHERE id = ?1",
                    params![stale.id.to_string()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?)
            })
            .await
            .unwrap();

        assert_eq!(deleted_at, Some(to_millis(expires_at)));
        assert_eq!(comment, None);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_leave_one_active() {
        let store = SqliteStore::open_memory().unwrap();
        let now = Utc::now();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .insert_short_code(short_code_params(
                        "race@x.com",
                        ShortCodeUsage::RequestRegister,
                        now,
                        false,
                    ))
                    .await
            }));
        }

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => assert!(e.is_already_exists()),
            }
        }
        assert_eq!(ok, 1);
    }

    #[tokio::test]
    async fn test_cancelled_insert_never_reaches_busy_connection() {
        let store = SqliteStore::open_memory().unwrap();
        let now = Utc::now();

        let conn = store.conn.clone();
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let holder = std::thread::spawn(move || {
            let _held = conn.lock().unwrap();
            locked_tx.send(()).unwrap();
            let _ = release_rx.recv();
        });
        locked_rx.recv().unwrap();

        let attempt = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            store.insert_short_code(short_code_params("u@x.com", ShortCodeUsage::ValidateMail, now, false)),
        )
        .await;
        assert!(attempt.is_err());

        release_tx.send(()).unwrap();
        holder.join().unwrap();

        let err = store
            .select_short_code_by_params(ShortCodeUsage::ValidateMail, "u@x.com")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        store
            .insert_short_code(short_code_params("u@x.com", ShortCodeUsage::ValidateMail, now, false))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_insert_rolls_back_open_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyward.db");
        let store = SqliteStore::open(&path).unwrap();
        let now = Utc::now();
        store
            .run(|conn| Ok(conn.busy_timeout(std::time::Duration::from_secs(5))?))
            .await
            .unwrap();

        // A second writer holds the database, so the insert waits inside
        // BEGIN IMMEDIATE while already owning the store's connection.
        let blocker = Connection::open(&path).unwrap();
        blocker.execute_batch("BEGIN IMMEDIATE").unwrap();

        let attempt = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            store.insert_short_code(short_code_params("u@x.com", ShortCodeUsage::ResetPassword, now, false)),
        )
        .await;
        assert!(attempt.is_err());
        blocker.execute_batch("ROLLBACK").unwrap();

        let rows: i64 = store
            .run(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM short_codes", [], |row| row.get(0))?))
            .await
            .unwrap();
        assert_eq!(rows, 0);

        let retry = store
            .insert_short_code(short_code_params("u@x.com", ShortCodeUsage::ResetPassword, now, false))
            .await;
        assert!(retry.is_ok());
    }

    #[tokio::test]
    async fn test_poisoned_connection_lock() {
        let store = SqliteStore::open_memory().unwrap();
        let conn = store.conn.clone();
        let _ = std::thread::spawn(move || {
            let _held = conn.lock().unwrap();
            panic!("writer died");
        })
        .join();

        let err = store.search_keys(KeyUsage::Auth).await.unwrap_err();
        assert!(matches!(err, StoreError::LockPoisoned(_)));
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyward.db");
        let now = Utc::now();

        let key_id = {
            let store = SqliteStore::open(&path).unwrap();
            let key = store
                .insert_key(insert_key_params(KeyUsage::Refresh, now, now + Duration::days(1)))
                .await
                .unwrap();
            store
                .insert_short_code(short_code_params("u@x.com", ShortCodeUsage::ValidateMail, now, false))
                .await
                .unwrap();
            key.id
        };

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.select_key(key_id).await.unwrap().usage, KeyUsage::Refresh);
        assert!(store
            .select_short_code_by_params(ShortCodeUsage::ValidateMail, "u@x.com")
            .await
            .is_ok());
        assert!(store.search_keys(KeyUsage::Refresh).await.unwrap().len() <= MAX_BATCH_SIZE);
    }
}
