//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// The database clock as Unix milliseconds.
///
/// Active projections are evaluated against this, not the caller's clock.
pub const DB_NOW_MS: &str = "CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)";

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                &format!(
                    "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, {})",
                    DB_NOW_MS
                ),
                rusqlite::params![version],
            )?;
        }

        tx.commit()?;
        tracing::info!(version = CURRENT_VERSION, "schema migrated");
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: keys, short codes, and their active projections.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        r#"
        -- Signing keys. Rows are only ever annotated, never rewritten.
        CREATE TABLE keys (
            id TEXT PRIMARY KEY,              -- UUID, doubles as the JWK kid
            private_material TEXT NOT NULL,   -- envelope ciphertext, base64url
            public_material TEXT,             -- plaintext JWK, base64url; NULL for symmetric keys
            usage TEXT NOT NULL,
            created_at INTEGER NOT NULL,      -- Unix ms
            expires_at INTEGER NOT NULL,      -- Unix ms
            deleted_at INTEGER,
            deleted_comment TEXT
        );

        -- One-time codes. `code` is a keyed digest of the cleartext.
        CREATE TABLE short_codes (
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL,
            usage TEXT NOT NULL,
            target TEXT NOT NULL,
            data BLOB,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            deleted_at INTEGER,
            deleted_comment TEXT
        );

        -- Active projections. Deletion does not hide a key, expiry does.
        CREATE VIEW active_keys AS
            SELECT * FROM keys WHERE expires_at > {now};

        CREATE VIEW active_short_codes AS
            SELECT * FROM short_codes WHERE deleted_at IS NULL AND expires_at > {now};

        -- At most one undeleted code per slot. Expired rows are sealed by the
        -- insert path before a new row lands, so this covers active rows.
        CREATE UNIQUE INDEX idx_short_codes_one_open_per_slot
            ON short_codes(target, usage) WHERE deleted_at IS NULL;

        CREATE INDEX idx_keys_usage_created ON keys(usage, created_at DESC);
        CREATE INDEX idx_short_codes_slot ON short_codes(target, usage);
        "#,
        now = DB_NOW_MS
    ))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(conn: &Connection, kind: &str) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type = ?1 ORDER BY name")
            .unwrap()
            .query_map([kind], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_migration_creates_schema() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables = names(&conn, "table");
        assert!(tables.contains(&"keys".to_string()));
        assert!(tables.contains(&"short_codes".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));

        let views = names(&conn, "view");
        assert_eq!(views, vec!["active_keys", "active_short_codes"]);

        let indexes = names(&conn, "index");
        assert!(indexes.contains(&"idx_short_codes_one_open_per_slot".to_string()));
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (99, 0)",
            [],
        )
        .unwrap();

        assert!(matches!(migrate(&mut conn), Err(StoreError::Migration(_))));
    }

    #[test]
    fn test_db_clock_is_close_to_wall_clock() {
        let conn = Connection::open_in_memory().unwrap();
        let db_now: i64 = conn
            .query_row(&format!("SELECT {}", DB_NOW_MS), [], |row| row.get(0))
            .unwrap();
        let wall = chrono::Utc::now().timestamp_millis();
        assert!((db_now - wall).abs() < 5_000);
    }
}
