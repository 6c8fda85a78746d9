//! Cached, self-renewing lease handle.
//!
//! A [`LeaseHandle`] answers "do I hold this lock?" from an atomic flag. An
//! active handle keeps a renewal task on the coordinator's scheduler that
//! re-acquires the lease every renewal period and writes the answer into
//! that flag. Callers never wait on the database once the handle is active.
//!
//! The handle starts INACTIVE (no renewal, not held). `activate()`, or the
//! first `has_lock()`, makes it ACTIVE. `deactivate()` stops renewing and
//! releases the row so another instance can take over without waiting for
//! the lease to run out.
//!
//! Any renewal failure counts as losing the lock. Assuming the lock is still
//! held after an error could leave two instances acting as holder at once.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::coordinator::{LockCoordinator, RenewalOutcome};
use crate::scheduler::ScheduledTask;

/// Point-in-time view of a handle, for logs and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaseStatus {
    pub lock_name: String,
    pub held: bool,
    pub active: bool,
    pub instance_id: String,
}

impl fmt::Display for LeaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lock_name={} has_lock={} active={} instance_id={}",
            self.lock_name, self.held, self.active, self.instance_id
        )
    }
}

/// State shared between the handle, its renewal task, and the coordinator's
/// registry.
pub(crate) struct LeaseState {
    name: String,
    coordinator: Arc<LockCoordinator>,
    held: AtomicBool,
    active: AtomicBool,
    /// `Some` exactly while active. Serializes activate/deactivate.
    renewal: tokio::sync::Mutex<Option<ScheduledTask>>,
}

impl LeaseState {
    pub(crate) fn new(coordinator: Arc<LockCoordinator>, name: &str) -> Arc<Self> {
        Arc::new(LeaseState {
            name: name.to_string(),
            coordinator,
            held: AtomicBool::new(false),
            active: AtomicBool::new(false),
            renewal: tokio::sync::Mutex::new(None),
        })
    }

    /// One renewal. The renewal task is the only writer of `held` while the
    /// handle is active.
    async fn renew(&self) {
        if !self.active.load(Ordering::SeqCst) {
            self.held.store(false, Ordering::SeqCst);
            return;
        }

        let ttl_secs = self.coordinator.config().lease_ttl_secs;
        let outcome = self.coordinator.renew(&self.name, ttl_secs).await;
        if let RenewalOutcome::Failed(err) = &outcome {
            tracing::error!(
                lock = %self.name,
                instance_id = %self.coordinator.instance_id(),
                error = %err,
                "lease renewal failed, treating lock as not held"
            );
        }

        let held = outcome.is_held();
        let was_held = self.held.swap(held, Ordering::SeqCst);
        if held && !was_held {
            tracing::info!(lock = %self.name, instance_id = %self.coordinator.instance_id(), "lock acquired");
        } else if !held && was_held {
            tracing::warn!(lock = %self.name, instance_id = %self.coordinator.instance_id(), "lock lost");
        }
    }

    async fn activate(self: &Arc<Self>) {
        let mut renewal = self.renewal.lock().await;
        if renewal.is_some() {
            return;
        }
        if self.coordinator.is_shut_down() {
            tracing::debug!(lock = %self.name, "coordinator shut down, lease not activated");
            return;
        }

        self.active.store(true, Ordering::SeqCst);
        self.renew().await;

        // Weak so an abandoned renewal task cannot keep the state alive.
        let state: Weak<Self> = Arc::downgrade(self);
        let coordinator = &self.coordinator;
        *renewal = Some(coordinator.scheduler().schedule_fixed_rate(
            format!("lease-renewal:{}", self.name),
            coordinator.config().renewal_period,
            move || {
                let state = state.clone();
                async move {
                    if let Some(state) = state.upgrade() {
                        state.renew().await;
                    }
                }
            },
        ));

        tracing::debug!(lease = %self.status(), "lease activated");
    }

    /// Stops the renewal task, then releases the row. No late renewal can
    /// re-acquire the row once this returns.
    pub(crate) async fn deactivate(&self) {
        let mut renewal = self.renewal.lock().await;
        self.active.store(false, Ordering::SeqCst);
        if let Some(task) = renewal.take() {
            task.cancel().await;
        }
        self.held.store(false, Ordering::SeqCst);

        if let Err(err) = self.coordinator.release(&self.name).await {
            tracing::warn!(
                lock = %self.name,
                error = %err,
                "release failed, lease will expire on its own"
            );
        }
        tracing::debug!(lease = %self.status(), "lease deactivated");
    }

    fn status(&self) -> LeaseStatus {
        LeaseStatus {
            lock_name: self.name.clone(),
            held: self.held.load(Ordering::SeqCst),
            active: self.active.load(Ordering::SeqCst),
            instance_id: self.coordinator.instance_id().to_string(),
        }
    }
}

/// One per lock name per coordinator; created by [`LockCoordinator::lease`].
pub struct LeaseHandle {
    state: Arc<LeaseState>,
    torn_down: AtomicBool,
}

impl LeaseHandle {
    /// Wraps state already reserved in the coordinator's registry.
    pub(crate) fn new(state: Arc<LeaseState>) -> Self {
        LeaseHandle {
            state,
            torn_down: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Starts keeping the lock: one renewal now, then one every renewal
    /// period. No-op if already active or if the coordinator has shut down.
    pub async fn activate(&self) {
        self.state.activate().await;
    }

    /// Stops renewing, drops the cached answer to "not held", and releases
    /// the row best-effort.
    ///
    /// The renewal task has fully stopped before the release is sent. If the
    /// release fails the row expires on its own after one TTL.
    pub async fn deactivate(&self) {
        self.state.deactivate().await;
    }

    /// Whether this instance holds the lock, from the cached answer.
    ///
    /// Activates the handle first if it is inactive: asking implies wanting
    /// to keep the lock.
    pub async fn has_lock(&self) -> bool {
        if !self.state.active.load(Ordering::SeqCst) {
            self.activate().await;
        }
        self.state.held.load(Ordering::SeqCst)
    }

    /// The cached answer without activating.
    pub fn is_held(&self) -> bool {
        self.state.held.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Polls [`has_lock`](Self::has_lock) until it is true or `timeout`
    /// elapses, then returns the last answer.
    ///
    /// A timeout too large to represent as a deadline (`Duration::MAX`) waits
    /// without one. Gives up early once the coordinator has shut down.
    pub async fn lock_blocking(&self, timeout: Duration) -> bool {
        let poll = self.state.coordinator.config().poll_interval;
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let held = self.has_lock().await;
            if held || self.state.coordinator.is_shut_down() {
                return held;
            }
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return held;
                    }
                    poll.min(deadline - now)
                }
                None => poll,
            };
            tokio::time::sleep(wait).await;
        }
    }

    pub fn status(&self) -> LeaseStatus {
        self.state.status()
    }

    /// Deactivates and frees the name for a new handle.
    pub async fn shutdown(self) {
        tracing::info!(lease = %self.state.status(), "shutting down lease");
        self.deactivate().await;
        self.state
            .coordinator
            .registry()
            .release_lease(&self.state.name, &self.state);
        self.torn_down.store(true, Ordering::SeqCst);
    }
}

impl fmt::Display for LeaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LeaseHandle {}", self.state.status())
    }
}

impl fmt::Debug for LeaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaseHandle")
            .field("status", &self.state.status())
            .finish()
    }
}

impl Drop for LeaseHandle {
    /// Fallback for handles that were never shut down. Teardown runs in the
    /// background; the name stays reserved until the row is released, so a
    /// replacement handle cannot race the release.
    fn drop(&mut self) {
        if self.torn_down.load(Ordering::SeqCst) {
            return;
        }

        self.state.active.store(false, Ordering::SeqCst);
        self.state.held.store(false, Ordering::SeqCst);

        let state = Arc::clone(&self.state);
        let scheduler = state.coordinator.scheduler().clone();
        scheduler.spawn(async move {
            state.deactivate().await;
            state.coordinator.registry().release_lease(&state.name, &state);
        });
    }
}
