//! Storage layer for leasehold lease locks.
//!
//! Provides the [`LockStore`] trait defining the contract every backend
//! implements, plus [`SqliteLockStore`] and [`InMemoryLockStore`] as
//! first-class backends.
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`types`]: LockRecord, the persisted row
//! - [`traits`]: LockStore trait definition
//! - [`clock`]: Clock sources for backends that keep their own time
//! - [`memory`]: InMemoryLockStore implementation
//! - [`schema`]: SQL schema constants and migration setup
//! - [`sqlite`]: SqliteLockStore implementation

pub mod clock;
pub mod error;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod traits;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::StorageError;
pub use memory::InMemoryLockStore;
pub use sqlite::SqliteLockStore;
pub use traits::LockStore;
pub use types::LockRecord;
