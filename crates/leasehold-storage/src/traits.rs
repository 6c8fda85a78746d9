//! The [`LockStore`] trait defining the storage contract for lease locks.
//!
//! Two layers:
//! - **Primitive** operations (`acquire_or_renew`, `has_lock`, `release`,
//!   `clear_expired`) each run as one atomic statement.
//! - **Confirmed acquire** (`acquire`) runs the conditional write and the
//!   confirmation read as one unit, so no other holder can slip in between.
//!
//! All time comparisons use the store's own clock, never the caller's, which
//! takes client clock skew out of the correctness argument.

use crate::error::StorageError;
use crate::types::LockRecord;

/// The storage contract for lease locks.
///
/// Implementations must be safe to share between the renewal tasks of many
/// handles, hence `Send + Sync` and `&self` receivers. Calls are synchronous;
/// async callers are expected to move them onto a blocking pool.
pub trait LockStore: Send + Sync {
    /// Conditional upsert of the row for `name`.
    ///
    /// - no row: insert one owned by `holder`, expiring `ttl_secs` from now
    /// - row owned by `holder`: refresh `acquired_at` and `expires_at`
    /// - row owned by someone else but expired: transfer it to `holder`
    /// - row owned by someone else and live: leave it untouched
    ///
    /// The write does not report which case applied.
    fn acquire_or_renew(&self, name: &str, holder: &str, ttl_secs: u32)
        -> Result<(), StorageError>;

    /// True iff a row matches `name` and `holder` and has not expired.
    fn has_lock(&self, name: &str, holder: &str) -> Result<bool, StorageError>;

    /// [`acquire_or_renew`](Self::acquire_or_renew) followed by
    /// [`has_lock`](Self::has_lock) as one atomic unit.
    ///
    /// Returns whether `holder` owns the lock after the write.
    fn acquire(&self, name: &str, holder: &str, ttl_secs: u32) -> Result<bool, StorageError>;

    /// Deletes the row only if it is owned by `holder`.
    ///
    /// Returns `true` if a row was deleted.
    fn release(&self, name: &str, holder: &str) -> Result<bool, StorageError>;

    /// Deletes rows that expired more than `grace_secs` ago.
    ///
    /// Returns the number of rows removed. Only bounds table growth; lock
    /// correctness never depends on it.
    fn clear_expired(&self, grace_secs: u32) -> Result<usize, StorageError>;

    /// Reads the raw row for `name`, expired or not.
    fn get(&self, name: &str) -> Result<Option<LockRecord>, StorageError>;

    /// Lists every row ordered by name.
    fn list(&self) -> Result<Vec<LockRecord>, StorageError>;
}
