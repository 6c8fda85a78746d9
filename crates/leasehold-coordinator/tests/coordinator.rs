//! Integration tests for one-shot coordinator operations and the sweep.

mod common;

use std::sync::Arc;
use std::time::Duration;

use leasehold_coordinator::{InstanceId, LeaseError, LockConfig, LockCoordinator};
use leasehold_storage::{InMemoryLockStore, LockStore, ManualClock, StorageError};

use common::{fast_config, two_processes, FlakyStore};

#[tokio::test]
async fn acquire_has_lock_release() {
    let (a, b, _) = two_processes(fast_config());

    assert!(a.acquire("billing", 2).await.unwrap());
    assert!(a.has_lock("billing").await.unwrap());
    assert!(!b.acquire("billing", 2).await.unwrap());
    assert!(!b.has_lock("billing").await.unwrap());

    // Only the holder's release deletes the row.
    assert!(!b.release("billing").await.unwrap());
    assert!(a.release("billing").await.unwrap());
    assert!(!a.has_lock("billing").await.unwrap());

    assert!(b.acquire("billing", 2).await.unwrap());
}

#[tokio::test]
async fn caller_chosen_identity_is_the_holder() {
    let store = Arc::new(InMemoryLockStore::new());
    let id = InstanceId::random();
    let coordinator = LockCoordinator::with_instance_id(store.clone(), fast_config(), id).unwrap();

    coordinator.acquire("billing", 2).await.unwrap();
    let rec = store.get("billing").unwrap().unwrap();
    assert_eq!(rec.holder, id.to_string());
}

#[tokio::test]
async fn store_failures_propagate_from_one_shot_calls() {
    let flaky = Arc::new(FlakyStore::new(Arc::new(InMemoryLockStore::new())));
    let coordinator = LockCoordinator::new(flaky.clone(), fast_config()).unwrap();
    flaky.set_failing(true);

    let err = coordinator.acquire("billing", 2).await.unwrap_err();
    assert!(matches!(err, LeaseError::Storage(StorageError::Unavailable(_))));
    assert!(coordinator.has_lock("billing").await.is_err());
    assert!(coordinator.release("billing").await.is_err());
    assert!(!coordinator.renew("billing", 2).await.is_held());
}

#[tokio::test]
async fn sweep_removes_only_rows_past_grace() {
    let clock = Arc::new(ManualClock::new(10_000_000));
    let store = Arc::new(InMemoryLockStore::with_clock(clock.clone()));
    let config = LockConfig {
        sweep_grace_secs: 60,
        ..fast_config()
    };
    let a = LockCoordinator::new(store.clone(), config.clone()).unwrap();
    let b = LockCoordinator::new(store.clone(), config).unwrap();

    a.acquire("old", 1).await.unwrap();
    clock.advance(Duration::from_secs(120));
    b.acquire("recent", 1).await.unwrap();
    clock.advance(Duration::from_secs(30));

    assert_eq!(a.sweep_once().await, 1);
    assert!(store.get("old").unwrap().is_none());
    assert!(store.get("recent").unwrap().is_some());
    assert_eq!(a.sweep_once().await, 0);
}

#[tokio::test]
async fn failed_sweep_reports_zero() {
    let flaky = Arc::new(FlakyStore::new(Arc::new(InMemoryLockStore::new())));
    let coordinator = LockCoordinator::new(flaky.clone(), fast_config()).unwrap();
    flaky.set_failing(true);

    assert_eq!(coordinator.sweep_once().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sweep_starts_with_coordinator_and_stops_on_shutdown() {
    let clock = Arc::new(ManualClock::new(10_000_000));
    let store = Arc::new(InMemoryLockStore::with_clock(clock.clone()));
    let config = LockConfig {
        sweep_period: Duration::from_millis(50),
        sweep_grace_secs: 1,
        ..fast_config()
    };
    let coordinator = LockCoordinator::new(store.clone(), config).unwrap();

    coordinator.acquire("stale", 1).await.unwrap();
    clock.advance(Duration::from_secs(10));

    // Already running from construction; a second start is a no-op.
    coordinator.start_sweep();

    let mut swept = false;
    for _ in 0..40 {
        if store.get("stale").unwrap().is_none() {
            swept = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(swept, "periodic sweep never removed the stale row");

    coordinator.shutdown().await;
    coordinator.shutdown().await;
    assert!(coordinator.is_shut_down());

    // No sweep after shutdown, even if asked again.
    coordinator.start_sweep();
    coordinator.acquire("stale", 1).await.unwrap();
    clock.advance(Duration::from_secs(10));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(store.get("stale").unwrap().is_some());
}

#[tokio::test]
async fn reserved_names_track_live_handles() {
    let (a, _, _) = two_processes(fast_config());
    assert!(a.reserved_names().is_empty());

    let first = a.lease("zeta").unwrap();
    let second = a.lease("alpha").unwrap();
    assert_eq!(a.reserved_names(), vec!["alpha".to_string(), "zeta".to_string()]);

    first.shutdown().await;
    second.shutdown().await;
    assert!(a.reserved_names().is_empty());
    assert!(!a.clear_reservation("alpha"));
}
