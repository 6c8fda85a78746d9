//! Storage-layer types for persisted lock rows.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One persisted lock row.
///
/// Timestamps are unix milliseconds as measured by the store's clock. A row
/// whose `expires_at` is not in the future is owned by nobody, even though it
/// stays readable until a sweep removes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Lock name (primary key).
    pub name: String,
    /// Identity of the process instance that last (re)acquired the lock.
    pub holder: String,
    /// When the current holder last acquired or renewed the lease.
    pub acquired_at: i64,
    /// Lease deadline.
    pub expires_at: i64,
}

impl LockRecord {
    /// Returns `true` if the lease is no longer owned at `now_ms`.
    ///
    /// This is the steal predicate: a row is stealable exactly when it is not
    /// owned, so there is no instant where it is neither.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at <= now_ms
    }

    /// Returns `true` if `holder` owns this row at `now_ms`.
    pub fn is_held_by(&self, holder: &str, now_ms: i64) -> bool {
        self.holder == holder && !self.is_expired_at(now_ms)
    }
}

impl fmt::Display for LockRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "name={} holder={} acquired_at={} expires_at={}",
            self.name, self.holder, self.acquired_at, self.expires_at
        )
    }
}
