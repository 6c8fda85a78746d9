//! Storage error types for leasehold-storage.
//!
//! [`StorageError`] covers every failure a lock backend can report. All of
//! them are treated as transient by the coordinator's renewal path: a failed
//! renewal means "not held", never "still held".

use thiserror::Error;

/// Errors produced by lock store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The SQLite driver reported an error (busy database, I/O, constraint).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// A mutex guarding backend state was poisoned by a panicking thread.
    #[error("lock store state poisoned during {0}")]
    Poisoned(&'static str),

    /// The backend is unreachable or refused the operation.
    #[error("lock store unavailable: {0}")]
    Unavailable(String),
}
