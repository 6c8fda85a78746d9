//! SQLite implementation of [`LockStore`].
//!
//! [`SqliteLockStore`] keeps lock rows in the `lock_records` table. Every
//! statement compares against SQLite's own clock, so processes with skewed
//! local clocks still agree on who owns a lease. The confirmed acquire runs in
//! a `BEGIN IMMEDIATE` transaction: the database write lock is taken before
//! the upsert and held through the confirmation read, so no other connection
//! can steal the row in between.

use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::error::StorageError;
use crate::schema::now_ms;
use crate::traits::LockStore;
use crate::types::LockRecord;

/// Insert, renew, or steal in one statement. The `WHERE` on the conflict
/// branch leaves a live row of another holder untouched.
const ACQUIRE_OR_RENEW: &str = concat!(
    "INSERT INTO lock_records (name, holder, acquired_at, expires_at) ",
    "VALUES (?1, ?2, ",
    now_ms!(),
    ", ",
    now_ms!(),
    " + ?3 * 1000) ",
    "ON CONFLICT(name) DO UPDATE SET ",
    "holder = excluded.holder, ",
    "acquired_at = excluded.acquired_at, ",
    "expires_at = excluded.expires_at ",
    "WHERE lock_records.holder = excluded.holder ",
    "OR lock_records.expires_at <= excluded.acquired_at"
);

const HAS_LOCK: &str = concat!(
    "SELECT EXISTS(SELECT 1 FROM lock_records ",
    "WHERE name = ?1 AND holder = ?2 AND expires_at > ",
    now_ms!(),
    ")"
);

const RELEASE: &str = "DELETE FROM lock_records WHERE name = ?1 AND holder = ?2";

const CLEAR_EXPIRED: &str = concat!(
    "DELETE FROM lock_records WHERE expires_at < ",
    now_ms!(),
    " - ?1 * 1000"
);

const SELECT_COLUMNS: &str = "SELECT name, holder, acquired_at, expires_at FROM lock_records";

/// SQLite-backed implementation of [`LockStore`].
///
/// The connection sits behind a mutex because `rusqlite::Connection` is
/// `!Sync`; renewal tasks of different handles take turns on it. Separate
/// processes open their own `SqliteLockStore` on the same file.
pub struct SqliteLockStore {
    conn: Mutex<Connection>,
}

impl SqliteLockStore {
    /// Opens (or creates) a SQLite database at `path`.
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = crate::schema::open_database(path)?;
        Ok(SqliteLockStore {
            conn: Mutex::new(conn),
        })
    }

    /// Opens a private in-memory SQLite database (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = crate::schema::open_in_memory()?;
        Ok(SqliteLockStore {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self, operation: &'static str) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Poisoned(operation))
    }
}

fn upsert(conn: &Connection, name: &str, holder: &str, ttl_secs: u32) -> Result<(), StorageError> {
    conn.execute(ACQUIRE_OR_RENEW, params![name, holder, i64::from(ttl_secs)])?;
    Ok(())
}

fn holds(conn: &Connection, name: &str, holder: &str) -> Result<bool, StorageError> {
    let held: bool = conn.query_row(HAS_LOCK, params![name, holder], |row| row.get(0))?;
    Ok(held)
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LockRecord> {
    Ok(LockRecord {
        name: row.get(0)?,
        holder: row.get(1)?,
        acquired_at: row.get(2)?,
        expires_at: row.get(3)?,
    })
}

impl LockStore for SqliteLockStore {
    fn acquire_or_renew(
        &self,
        name: &str,
        holder: &str,
        ttl_secs: u32,
    ) -> Result<(), StorageError> {
        let conn = self.conn("acquire_or_renew")?;
        upsert(&conn, name, holder, ttl_secs)
    }

    fn has_lock(&self, name: &str, holder: &str) -> Result<bool, StorageError> {
        let conn = self.conn("has_lock")?;
        holds(&conn, name, holder)
    }

    fn acquire(&self, name: &str, holder: &str, ttl_secs: u32) -> Result<bool, StorageError> {
        let mut conn = self.conn("acquire")?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        upsert(&tx, name, holder, ttl_secs)?;
        let held = holds(&tx, name, holder)?;
        tx.commit()?;
        Ok(held)
    }

    fn release(&self, name: &str, holder: &str) -> Result<bool, StorageError> {
        let conn = self.conn("release")?;
        let deleted = conn.execute(RELEASE, params![name, holder])?;
        Ok(deleted > 0)
    }

    fn clear_expired(&self, grace_secs: u32) -> Result<usize, StorageError> {
        let conn = self.conn("clear_expired")?;
        let deleted = conn.execute(CLEAR_EXPIRED, params![i64::from(grace_secs)])?;
        Ok(deleted)
    }

    fn get(&self, name: &str) -> Result<Option<LockRecord>, StorageError> {
        let conn = self.conn("get")?;
        let record = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE name = ?1"),
                params![name],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn list(&self) -> Result<Vec<LockRecord>, StorageError> {
        let conn = self.conn("list")?;
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY name"))?;
        let records = stmt
            .query_map([], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}
