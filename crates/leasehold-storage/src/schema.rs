//! SQL schema constants and migration setup for the SQLite backend.
//!
//! Uses `rusqlite_migration` to manage schema migrations via SQLite's
//! `user_version` pragma. Migrations are embedded at compile time via
//! `include_str!`.

use std::time::Duration;

use rusqlite::Connection;
use rusqlite_migration::{Migrations, M};

use crate::error::StorageError;

/// SQL expression for the current time in unix milliseconds, evaluated by
/// SQLite. A macro so statements can splice it in with `concat!`.
///
/// `julianday('now')` is stable for the duration of one statement, so every
/// occurrence inside a single statement sees the same instant.
macro_rules! now_ms {
    () => {
        "CAST((julianday('now') - 2440587.5) * 86400000.0 AS INTEGER)"
    };
}
pub(crate) use now_ms;

/// [`now_ms!`] as a plain constant.
pub const NOW_MS: &str = now_ms!();

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// All schema migrations, applied in order via `user_version` tracking.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(include_str!("migrations/001_lock_records.sql"))])
}

/// Opens (or creates) a SQLite database at `path` with WAL mode and all
/// pending migrations applied.
pub fn open_database(path: &str) -> Result<Connection, StorageError> {
    let mut conn = Connection::open(path)?;
    configure_and_migrate(&mut conn)?;
    Ok(conn)
}

/// Opens a private in-memory SQLite database with all migrations applied.
pub fn open_in_memory() -> Result<Connection, StorageError> {
    let mut conn = Connection::open_in_memory()?;
    configure_and_migrate(&mut conn)?;
    Ok(conn)
}

/// Configures pragmas and applies pending migrations.
fn configure_and_migrate(conn: &mut Connection) -> Result<(), StorageError> {
    // Several processes share the file; wait for the write lock instead of
    // failing immediately with SQLITE_BUSY.
    conn.busy_timeout(BUSY_TIMEOUT)?;
    // WAL lets readers proceed while one writer holds the lock. No-op in memory.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    migrations()
        .to_latest(conn)
        .map_err(|e| StorageError::Migration(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_reapply_cleanly() {
        let mut conn = open_in_memory().unwrap();
        assert!(migrations().to_latest(&mut conn).is_ok());
    }

    #[test]
    fn in_memory_has_lock_table() {
        let conn = open_in_memory().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'lock_records'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn now_ms_tracks_wall_clock() {
        let conn = open_in_memory().unwrap();
        let db_now: i64 = conn
            .query_row(&format!("SELECT {NOW_MS}"), [], |row| row.get(0))
            .unwrap();
        let local = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as i64;
        assert!((db_now - local).abs() < 5_000, "db={db_now} local={local}");
    }
}
