//! Shared helpers for coordinator integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use leasehold_coordinator::{LeaseError, LeaseHandle, LockConfig, LockCoordinator};
use leasehold_storage::{InMemoryLockStore, LockRecord, LockStore, StorageError};

/// Short timings so failover tests finish in a couple of seconds.
pub fn fast_config() -> LockConfig {
    LockConfig {
        lease_ttl_secs: 1,
        renewal_period: Duration::from_millis(200),
        poll_interval: Duration::from_millis(20),
        ..LockConfig::default()
    }
}

/// Wraps a store and fails every call while switched off, like a database
/// that became unreachable for one process only.
pub struct FlakyStore {
    inner: Arc<dyn LockStore>,
    failing: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn LockStore>) -> Self {
        FlakyStore {
            inner,
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

impl LockStore for FlakyStore {
    fn acquire_or_renew(&self, name: &str, holder: &str, ttl_secs: u32) -> Result<(), StorageError> {
        self.check()?;
        self.inner.acquire_or_renew(name, holder, ttl_secs)
    }

    fn has_lock(&self, name: &str, holder: &str) -> Result<bool, StorageError> {
        self.check()?;
        self.inner.has_lock(name, holder)
    }

    fn acquire(&self, name: &str, holder: &str, ttl_secs: u32) -> Result<bool, StorageError> {
        self.check()?;
        self.inner.acquire(name, holder, ttl_secs)
    }

    fn release(&self, name: &str, holder: &str) -> Result<bool, StorageError> {
        self.check()?;
        self.inner.release(name, holder)
    }

    fn clear_expired(&self, grace_secs: u32) -> Result<usize, StorageError> {
        self.check()?;
        self.inner.clear_expired(grace_secs)
    }

    fn get(&self, name: &str) -> Result<Option<LockRecord>, StorageError> {
        self.check()?;
        self.inner.get(name)
    }

    fn list(&self) -> Result<Vec<LockRecord>, StorageError> {
        self.check()?;
        self.inner.list()
    }
}

/// Two coordinators over one in-memory table, standing in for two processes
/// sharing a database.
pub fn two_processes(config: LockConfig) -> (Arc<LockCoordinator>, Arc<LockCoordinator>, Arc<InMemoryLockStore>) {
    let store = Arc::new(InMemoryLockStore::new());
    let a = LockCoordinator::new(store.clone(), config.clone()).unwrap();
    let b = LockCoordinator::new(store.clone(), config).unwrap();
    (a, b, store)
}

/// Creates the handle for `name` once background teardown of a dropped
/// handle has freed it. Panics after one second.
pub async fn lease_when_free(coordinator: &Arc<LockCoordinator>, name: &str) -> LeaseHandle {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    loop {
        match coordinator.lease(name) {
            Ok(handle) => return handle,
            Err(LeaseError::NameInUse(_)) if tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Err(err) => panic!("lease {name} never became free: {err}"),
        }
    }
}
