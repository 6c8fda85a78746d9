//! Error type for coordinator and lease handle operations.

use leasehold_storage::StorageError;

use crate::config::ConfigError;

/// Errors from coordinator and lease handle operations.
///
/// Only one-shot calls (`acquire`, `has_lock`, `release`, `clear_expired`)
/// and construction return these. The renewal path folds failures into
/// [`RenewalOutcome`](crate::coordinator::RenewalOutcome) instead.
#[derive(Debug, thiserror::Error)]
pub enum LeaseError {
    /// The lock store failed; treat the lock as not held.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A handle for this lock name already exists in this coordinator.
    #[error("lock name '{0}' is already in use; lock names must be unique per process")]
    NameInUse(String),

    /// The supplied configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The coordinator was created outside a tokio runtime.
    #[error("no tokio runtime available; create the coordinator from within a runtime")]
    NoRuntime,

    /// A background or blocking task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(String),
}
