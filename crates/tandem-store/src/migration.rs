//! Versioned SQLite schema.
//!
//! Each entry of [`MIGRATIONS`] moves the schema from version N-1 to N.
//! Applied versions are recorded in `schema_migrations`.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::{Result, StoreError};

/// Schema steps, in order. Version N is `MIGRATIONS[N - 1]`.
const MIGRATIONS: &[&str] = &[
    // v1: entries and per-remote watermarks
    r#"
    CREATE TABLE entries (
        added INTEGER PRIMARY KEY AUTOINCREMENT,  -- local sequence, never reused
        id_time INTEGER NOT NULL,
        id_node TEXT NOT NULL,
        id_seq INTEGER NOT NULL,
        time INTEGER NOT NULL,                    -- corrected timestamp
        action BLOB NOT NULL,                     -- CBOR
        origin TEXT,                              -- NULL for local entries
        UNIQUE(id_time, id_node, id_seq)
    );

    CREATE TABLE watermarks (
        remote TEXT NOT NULL,
        kind TEXT NOT NULL,                       -- last_sent / last_received / last_skipped
        value INTEGER NOT NULL,
        PRIMARY KEY (remote, kind)
    );

    CREATE INDEX idx_entries_created ON entries(time, id_time, id_node, id_seq);
    "#,
];

/// Schema version this build writes.
pub const CURRENT_VERSION: u32 = MIGRATIONS.len() as u32;

/// Bring the schema up to [`CURRENT_VERSION`].
///
/// Safe to call on every open. A database written by a newer build is
/// refused rather than modified.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (version INTEGER PRIMARY KEY)",
    )?;

    let applied: u32 = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get::<_, Option<u32>>(0)
        })
        .optional()?
        .flatten()
        .unwrap_or(0);

    if applied > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{applied} is newer than supported v{CURRENT_VERSION}"
        )));
    }

    let tx = conn.transaction()?;
    for (index, sql) in MIGRATIONS.iter().enumerate().skip(applied as usize) {
        let version = index as u32 + 1;
        debug!(version, "applying schema migration");
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            params![version],
        )?;
    }
    tx.commit()?;

    Ok(())
}
