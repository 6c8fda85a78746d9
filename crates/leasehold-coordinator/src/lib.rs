//! Lease-based mutual exclusion across processes that share one database.
//!
//! Every process builds one [`LockCoordinator`] over a shared
//! [`LockStore`](leasehold_storage::LockStore). For each task that must run on
//! only one instance at a time, the process asks the coordinator for a
//! [`LeaseHandle`] and checks [`LeaseHandle::has_lock`] before doing the work:
//!
//! ```ignore
//! let coordinator = LockCoordinator::new(store, LockConfig::from_env()?)?;
//!
//! let lease = coordinator.lease("nightly-report")?;
//! if lease.has_lock().await {
//!     run_report().await;
//! }
//! lease.shutdown().await;
//! coordinator.shutdown().await;
//! ```
//!
//! The coordinator sweeps long-expired rows on its own from construction.
//! `LockCoordinator::shutdown` releases any handles still active, which
//! covers handles that are never shut down individually.
//!
//! - [`coordinator`]: process identity, one-shot store operations, sweep,
//!   lease factory
//! - [`lease`]: cached self-renewing handle
//! - [`scheduler`]: fixed-rate background tasks
//! - [`registry`]: per-coordinator set of lock names in use
//! - [`config`]: timing configuration with environment overrides
//! - [`identity`]: instance identity
//! - [`error`]: LeaseError

pub mod config;
pub mod coordinator;
pub mod error;
pub mod identity;
pub mod lease;
pub mod registry;
pub mod scheduler;

pub use config::{ConfigError, LockConfig};
pub use coordinator::{LockCoordinator, RenewalOutcome};
pub use error::LeaseError;
pub use identity::InstanceId;
pub use lease::{LeaseHandle, LeaseStatus};
pub use registry::NameRegistry;
pub use scheduler::{ScheduledTask, Scheduler};
