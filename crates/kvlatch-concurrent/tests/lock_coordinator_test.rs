//! Integration tests for LockCoordinator
//!
//! Covers local serialization, timeouts, contention between coordinators that
//! share one store, and session renewal policies.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use common::{FaultyStore, fast_options};
use kvlatch_concurrent::{
    LatchError, LatchOptions, LockCoordinator, Phase, RenewalFailurePolicy, Timeout,
};
use kvlatch_store::{KvStore, MemoryKvStore, StoreError};
use parking_lot::Mutex;

fn coordinator(store: &MemoryKvStore, key: &str, options: &LatchOptions) -> LockCoordinator {
    LockCoordinator::new(Arc::new(store.clone()), key, options)
}

// ============================================================================
// Local serialization
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquires_never_overlap() {
    let store = MemoryKvStore::new();
    let lock = coordinator(&store, "jobs/lock", &LatchOptions::default());
    let inside = Arc::new(AtomicBool::new(false));
    let completed = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let lock = lock.clone();
        let inside = inside.clone();
        let completed = completed.clone();
        tasks.push(tokio::spawn(async move {
            let handle = lock.acquire(Timeout::Unbounded).await.unwrap();
            assert!(!inside.swap(true, Ordering::SeqCst), "two holders at once");
            tokio::time::sleep(Duration::from_millis(1)).await;
            inside.store(false, Ordering::SeqCst);
            completed.fetch_add(1, Ordering::SeqCst);
            handle.release().await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(completed.load(Ordering::SeqCst), 20);
    assert_eq!(lock.phase(), Phase::Idle);
    assert_eq!(lock.queued(), 0);
    assert!(store.get("jobs/lock").await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_fifo_order_skips_expired_waiters() {
    let store = MemoryKvStore::new();
    let lock = coordinator(&store, "k", &LatchOptions::default());
    let order = Arc::new(Mutex::new(Vec::new()));

    let holder = lock.acquire(Timeout::Unbounded).await.unwrap();

    let mut tasks = Vec::new();
    for (name, timeout) in [
        ("first", Timeout::Unbounded),
        ("impatient", Timeout::After(Duration::from_millis(10))),
        ("second", Timeout::Unbounded),
    ] {
        let pending = lock.acquire(timeout);
        let order = order.clone();
        tasks.push(tokio::spawn(async move {
            match pending.await {
                Ok(handle) => {
                    order.lock().push(name);
                    handle.release().await;
                }
                Err(e) => {
                    assert!(e.is_timeout());
                    order.lock().push("timed out");
                }
            }
        }));
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    holder.release().await;
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(*order.lock(), vec!["timed out", "first", "second"]);
}

// ============================================================================
// Timeouts
// ============================================================================

#[tokio::test]
async fn test_timed_out_waiter_never_succeeds() {
    let store = MemoryKvStore::new();
    let lock = coordinator(&store, "k", &LatchOptions::default());

    let holder = lock.acquire(Timeout::Unbounded).await.unwrap();
    let holder_session = store.holder("k");

    let err = lock
        .acquire(Duration::from_millis(20))
        .await
        .unwrap_err();
    assert!(matches!(err, LatchError::TimedOut));

    // The key is still attributed to the original holder only
    assert_eq!(store.holder("k"), holder_session);
    assert_eq!(lock.phase(), Phase::Holding);

    holder.release().await;
    assert_eq!(lock.phase(), Phase::Idle);
    assert_eq!(lock.queued(), 0);
}

#[tokio::test]
async fn test_second_coordinator_times_out_then_third_acquire_succeeds() {
    let store = MemoryKvStore::new();
    let a = coordinator(&store, "shared", &fast_options());
    let b = coordinator(&store, "shared", &fast_options());

    let held = a.acquire(Timeout::Unbounded).await.unwrap();
    let a_session = a.session_id().await;

    let err = b.acquire(Duration::from_millis(1)).await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(b.phase(), Phase::Idle);

    // B giving up must leave A's claim in place
    assert_eq!(store.holder("shared"), a_session);

    let third = b.acquire(Timeout::Unbounded);
    tokio::time::sleep(Duration::from_millis(20)).await;
    held.release().await;

    let handle = third.await.unwrap();
    assert_eq!(store.holder("shared"), b.session_id().await);
    handle.release().await;
}

#[tokio::test]
async fn test_bounded_acquire_succeeds_when_released_in_time() {
    let store = MemoryKvStore::new();
    let a = coordinator(&store, "shared", &fast_options());
    let b = coordinator(&store, "shared", &fast_options());

    let held = a.acquire(Timeout::Unbounded).await.unwrap();
    let pending = b.acquire(Duration::from_secs(5));

    tokio::time::sleep(Duration::from_millis(20)).await;
    held.release().await;

    let handle = pending.await.unwrap();
    assert_eq!(b.phase(), Phase::Holding);
    handle.release().await;
}

// ============================================================================
// Store failures
// ============================================================================

#[tokio::test]
async fn test_session_failure_is_reported_and_queue_advances() {
    let store = FaultyStore::new();
    let lock = LockCoordinator::new(store.clone(), "k", &LatchOptions::default());

    store.fail_sessions(true);
    let failing = lock.acquire(Timeout::Unbounded);
    let queued = lock.acquire(Timeout::Unbounded);

    let err = failing.await.unwrap_err();
    assert!(matches!(err, LatchError::Store(StoreError::Status { status: 500, .. })));

    // The queued waiter is promoted and also sees the failure
    assert!(queued.await.is_err());
    assert_eq!(lock.phase(), Phase::Idle);

    store.fail_sessions(false);
    let handle = lock.acquire(Timeout::Unbounded).await.unwrap();
    handle.release().await;
}

// ============================================================================
// Session renewal policies
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_keep_policy_reuses_dead_session() {
    let store = MemoryKvStore::new();
    let options = LatchOptions::default().with_session_ttl(Duration::from_secs(3));
    let lock = coordinator(&store, "k", &options);

    lock.acquire(Timeout::Unbounded).await.unwrap().release().await;
    let session = lock.session_id().await.unwrap();
    assert!(store.invalidate_session(&session));
    tokio::time::sleep(Duration::from_secs(5)).await;

    let err = lock.acquire(Timeout::Unbounded).await.unwrap_err();
    assert!(matches!(err, LatchError::Store(StoreError::InvalidSession(_))));
    assert_eq!(lock.session_id().await, Some(session));
    assert_eq!(lock.phase(), Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_recreate_policy_replaces_dead_session() {
    let store = MemoryKvStore::new();
    let options = LatchOptions::default()
        .with_session_ttl(Duration::from_secs(3))
        .with_renewal_failure(RenewalFailurePolicy::Recreate);
    let lock = coordinator(&store, "k", &options);

    lock.acquire(Timeout::Unbounded).await.unwrap().release().await;
    let session = lock.session_id().await.unwrap();
    assert!(store.invalidate_session(&session));
    tokio::time::sleep(Duration::from_secs(5)).await;

    let handle = lock.acquire(Timeout::Unbounded).await.unwrap();
    let replacement = lock.session_id().await.unwrap();
    assert_ne!(replacement, session);
    assert_eq!(store.holder("k"), Some(replacement));
    handle.release().await;
}
