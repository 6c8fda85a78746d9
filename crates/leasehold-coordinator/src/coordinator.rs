//! Per-process lock coordinator.
//!
//! [`LockCoordinator`] owns the process identity, the scheduler, and the
//! registry of lock names with a live handle. It is the only component that
//! talks to the [`LockStore`]. Store calls are synchronous, so they run on
//! tokio's blocking pool and never stall runtime workers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use leasehold_storage::{LockRecord, LockStore, StorageError};

use crate::config::LockConfig;
use crate::error::LeaseError;
use crate::identity::InstanceId;
use crate::lease::{LeaseHandle, LeaseState};
use crate::registry::NameRegistry;
use crate::scheduler::{ScheduledTask, Scheduler};

/// Result of one renewal attempt.
///
/// Losing the lock to another holder and failing to reach the store are both
/// ordinary outcomes; either way the caller must stop acting as holder.
#[derive(Debug)]
pub enum RenewalOutcome {
    /// This instance owns the lock until the new deadline.
    Held,
    /// Another instance owns a live lease.
    NotHeld,
    /// The store could not be asked. Ownership is unknown, so treat as lost.
    Failed(LeaseError),
}

impl RenewalOutcome {
    pub fn is_held(&self) -> bool {
        matches!(self, RenewalOutcome::Held)
    }
}

/// One per process: identity, store access, sweep, and the lease factory.
pub struct LockCoordinator {
    store: Arc<dyn LockStore>,
    instance_id: InstanceId,
    holder: String,
    config: LockConfig,
    registry: NameRegistry,
    scheduler: Scheduler,
    sweep: Mutex<Option<ScheduledTask>>,
    shut_down: AtomicBool,
}

impl LockCoordinator {
    /// Creates a coordinator with a fresh random identity and starts its
    /// periodic sweep.
    ///
    /// Must be called from within a tokio runtime; background tasks run there.
    pub fn new(store: Arc<dyn LockStore>, config: LockConfig) -> Result<Arc<Self>, LeaseError> {
        Self::with_instance_id(store, config, InstanceId::random())
    }

    /// Creates a coordinator with a caller-chosen identity.
    pub fn with_instance_id(
        store: Arc<dyn LockStore>,
        config: LockConfig,
        instance_id: InstanceId,
    ) -> Result<Arc<Self>, LeaseError> {
        config.validate()?;
        let scheduler = Scheduler::current()?;

        tracing::info!(
            instance_id = %instance_id,
            lease_ttl_secs = config.lease_ttl_secs,
            renewal_period_ms = config.renewal_period.as_millis() as u64,
            "lock coordinator created"
        );

        let coordinator = Arc::new(LockCoordinator {
            store,
            holder: instance_id.to_string(),
            instance_id,
            config,
            registry: NameRegistry::new(),
            scheduler,
            sweep: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        });
        coordinator.start_sweep();
        Ok(coordinator)
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub(crate) fn registry(&self) -> &NameRegistry {
        &self.registry
    }

    /// Whether [`shutdown`](Self::shutdown) has been called. Lease handles
    /// refuse to activate afterwards.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Runs a store call on the blocking pool.
    async fn with_store<T, F>(&self, call: F) -> Result<T, LeaseError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn LockStore) -> Result<T, StorageError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || call(store.as_ref()))
            .await
            .map_err(|e| LeaseError::Task(e.to_string()))?;
        Ok(result?)
    }

    // -------------------------------------------------------------------
    // One-shot operations (errors propagate)
    // -------------------------------------------------------------------

    /// Acquires or renews `name` for this instance and reports whether this
    /// instance holds it afterwards.
    ///
    /// The conditional write and the confirmation read run in one transaction.
    pub async fn acquire(&self, name: &str, ttl_secs: u32) -> Result<bool, LeaseError> {
        let name = name.to_string();
        let holder = self.holder.clone();
        self.with_store(move |store| store.acquire(&name, &holder, ttl_secs))
            .await
    }

    /// Asks the store whether this instance currently holds `name`.
    pub async fn has_lock(&self, name: &str) -> Result<bool, LeaseError> {
        let name = name.to_string();
        let holder = self.holder.clone();
        self.with_store(move |store| store.has_lock(&name, &holder))
            .await
    }

    /// Releases `name` if this instance holds it. Returns whether a row was
    /// deleted.
    pub async fn release(&self, name: &str) -> Result<bool, LeaseError> {
        let name = name.to_string();
        let holder = self.holder.clone();
        self.with_store(move |store| store.release(&name, &holder))
            .await
    }

    /// Deletes rows expired for longer than `grace_secs`.
    pub async fn clear_expired(&self, grace_secs: u32) -> Result<usize, LeaseError> {
        self.with_store(move |store| store.clear_expired(grace_secs))
            .await
    }

    /// Reads the raw row for `name`.
    pub async fn record(&self, name: &str) -> Result<Option<LockRecord>, LeaseError> {
        let name = name.to_string();
        self.with_store(move |store| store.get(&name)).await
    }

    // -------------------------------------------------------------------
    // Background paths (errors are data)
    // -------------------------------------------------------------------

    /// One renewal attempt for the renewal loop.
    pub async fn renew(&self, name: &str, ttl_secs: u32) -> RenewalOutcome {
        match self.acquire(name, ttl_secs).await {
            Ok(true) => RenewalOutcome::Held,
            Ok(false) => RenewalOutcome::NotHeld,
            Err(err) => RenewalOutcome::Failed(err),
        }
    }

    /// One sweep with the configured grace window. Failures are logged and
    /// reported as zero rows removed.
    pub async fn sweep_once(&self) -> usize {
        match self.clear_expired(self.config.sweep_grace_secs).await {
            Ok(removed) => {
                if removed > 0 {
                    tracing::info!(
                        removed,
                        grace_secs = self.config.sweep_grace_secs,
                        "swept expired lock rows"
                    );
                }
                removed
            }
            Err(err) => {
                tracing::error!(error = %err, "sweep of expired lock rows failed");
                0
            }
        }
    }

    /// Starts the periodic sweep. Construction already calls this; calling
    /// it again while running, or after shutdown, is a no-op.
    pub fn start_sweep(self: &Arc<Self>) {
        let Ok(mut sweep) = self.sweep.lock() else {
            tracing::error!("sweep state poisoned; sweep not started");
            return;
        };
        if sweep.is_some() || self.is_shut_down() {
            return;
        }

        // Weak so the task does not keep the coordinator alive.
        let coordinator: Weak<Self> = Arc::downgrade(self);
        *sweep = Some(self.scheduler.schedule_fixed_rate(
            "lock-sweep",
            self.config.sweep_period,
            move || {
                let coordinator = coordinator.clone();
                async move {
                    if let Some(coordinator) = coordinator.upgrade() {
                        coordinator.sweep_once().await;
                    }
                }
            },
        ));
    }

    /// Stops the sweep, then deactivates every live lease handle so their
    /// rows are released before the process exits.
    ///
    /// Handles stay registered until they are shut down or dropped, but can
    /// no longer activate. One-shot operations keep working.
    pub async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);

        let task = match self.sweep.lock() {
            Ok(mut sweep) => sweep.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            task.cancel().await;
        }

        let leases = self.registry.live();
        let released = leases.len();
        for lease in leases {
            lease.deactivate().await;
        }
        tracing::info!(
            instance_id = %self.instance_id,
            released,
            "lock coordinator shut down"
        );
    }

    // -------------------------------------------------------------------
    // Lease factory
    // -------------------------------------------------------------------

    /// Creates the handle for `name`. Fails without starting anything if a
    /// handle for `name` already exists in this coordinator.
    pub fn lease(self: &Arc<Self>, name: &str) -> Result<LeaseHandle, LeaseError> {
        let state = LeaseState::new(Arc::clone(self), name);
        self.registry.reserve(name, Arc::downgrade(&state))?;
        let handle = LeaseHandle::new(state);
        tracing::info!(lease = %handle, "created lease handle");
        Ok(handle)
    }

    /// Forcibly frees a reserved name so a new handle can be created for it.
    ///
    /// The old handle, if any, keeps running and shares this instance's
    /// holder identity, so its eventual release also frees the row for the
    /// new handle. Intended for teardown paths that lost track of it.
    pub fn clear_reservation(&self, name: &str) -> bool {
        self.registry.unregister(name)
    }

    /// Names that currently have a handle.
    pub fn reserved_names(&self) -> Vec<String> {
        self.registry.names()
    }
}
