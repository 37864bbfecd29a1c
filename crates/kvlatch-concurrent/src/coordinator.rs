//! Lock coordinator: one lock key, one session, one active waiter at a time
//!
//! Local callers are serialized into a single active waiter plus a FIFO queue.
//! The active waiter drives the session and the claim loop; everyone else waits
//! in the queue until a release promotes them or their timer expires them.
//!
//! ```text
//!            acquire (idle)                 claim succeeds
//!   Idle ────────────────────▶ Attempting ────────────────▶ Holding
//!    ▲                            │   ▲                        │
//!    │ queue exhausted            │   │ next live waiter       │ release
//!    └────────────────────────────┴───┴────────────────────────┘
//!                         claim fails
//! ```
//!
//! The idle/busy decision and every queue push/pop happen under one mutex, so
//! the order of concurrent `acquire` calls is fixed when they are made, not
//! when their I/O completes.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use kvlatch_store::{KvStore, PutOptions};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{LatchError, Result};
use crate::hunter::AcquisitionHunter;
use crate::options::{LatchOptions, Timeout};
use crate::session::SessionManager;
use crate::waiter::Waiter;

/// Coordinator state as seen from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No active waiter, queue empty
    Idle,
    /// The active waiter is creating its session or polling for the key
    Attempting,
    /// The active waiter holds the key
    Holding,
}

struct CoordinatorState {
    phase: Phase,
    active: Option<Arc<Waiter>>,
    queue: VecDeque<Arc<Waiter>>,
}

struct Inner {
    key: String,
    store: Arc<dyn KvStore>,
    session: SessionManager,
    hunter: AcquisitionHunter,
    state: Mutex<CoordinatorState>,
}

/// Serializes local acquisitions of one lock key.
///
/// Cloning is cheap; clones share the same queue and session.
#[derive(Clone)]
pub struct LockCoordinator {
    inner: Arc<Inner>,
}

impl LockCoordinator {
    pub fn new(store: Arc<dyn KvStore>, key: impl Into<String>, options: &LatchOptions) -> Self {
        let key = key.into();
        Self {
            inner: Arc::new(Inner {
                session: SessionManager::new(store.clone(), options),
                hunter: AcquisitionHunter::new(store.clone(), key.clone(), options.poll_interval),
                key,
                store,
                state: Mutex::new(CoordinatorState {
                    phase: Phase::Idle,
                    active: None,
                    queue: VecDeque::new(),
                }),
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    /// Number of live waiters queued behind the active one
    pub fn queued(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Session id backing this coordinator, once created
    pub async fn session_id(&self) -> Option<String> {
        self.inner.session.session_id().await
    }

    /// Request the lock.
    ///
    /// The request is registered before this returns: a call made while the
    /// coordinator is idle becomes the active attempt, any other call is queued
    /// behind it. The returned future resolves to a `LockHandle` once the key is
    /// claimed, or to `LatchError::TimedOut` / a store error.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn acquire(
        &self,
        timeout: impl Into<Timeout>,
    ) -> impl Future<Output = Result<LockHandle>> + Send + 'static {
        let deadline = timeout.into().deadline_from(Instant::now());
        let (waiter, rx) = Waiter::new(deadline);
        self.inner.enqueue(waiter);

        async move { rx.await.unwrap_or(Err(LatchError::Closed)) }
    }
}

impl fmt::Debug for LockCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockCoordinator")
            .field("key", &self.inner.key)
            .field("phase", &self.phase())
            .finish()
    }
}

impl Inner {
    fn enqueue(self: &Arc<Self>, waiter: Arc<Waiter>) {
        let promoted = {
            let mut state = self.state.lock();
            if state.active.is_none() {
                waiter.accept();
                state.active = Some(waiter.clone());
                state.phase = Phase::Attempting;
                true
            } else {
                state.queue.push_back(waiter.clone());
                false
            }
        };

        if promoted {
            tokio::spawn(self.clone().attempt(waiter));
        } else if let Some(deadline) = waiter.deadline() {
            let coordinator = Arc::downgrade(self);
            let queued = waiter.clone();
            let timer = tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                if queued.expire() {
                    Inner::dequeue(&coordinator, &queued);
                }
            });
            waiter.set_timer(timer.abort_handle());
        }
    }

    /// Drop an expired waiter from the queue
    fn dequeue(coordinator: &Weak<Self>, waiter: &Arc<Waiter>) {
        if let Some(inner) = coordinator.upgrade() {
            inner
                .state
                .lock()
                .queue
                .retain(|queued| !Arc::ptr_eq(queued, waiter));
            debug!("Queued waiter for '{}' timed out", inner.key);
        }
    }

    /// Drive session creation and the claim loop for the active waiter
    async fn attempt(self: Arc<Self>, waiter: Arc<Waiter>) {
        let session_id = match self.session.get_or_create().await {
            Ok(session_id) => session_id,
            Err(e) => {
                debug!("Could not get a session for '{}': {}", self.key, e);
                waiter.deliver(Err(e));
                self.promote_next();
                return;
            }
        };

        match self.hunter.try_claim(&session_id, waiter.deadline()).await {
            Ok(()) => {
                self.state.lock().phase = Phase::Holding;
                debug!("Lock '{}' held by session {}", self.key, session_id);

                let handle = LockHandle::new(self.clone());
                if let Some(Ok(unclaimed)) = waiter.deliver(Ok(handle)) {
                    debug!("Acquirer of '{}' went away, releasing", self.key);
                    unclaimed.release().await;
                }
            }
            Err(e) => {
                debug!("Attempt on '{}' failed: {}", self.key, e);
                waiter.deliver(Err(e));
                self.abandon(&session_id).await;
                self.promote_next();
            }
        }
    }

    /// Release path of a real holder: delete the key, then promote
    async fn release(self: Arc<Self>) {
        if let Err(e) = self.store.delete(&self.key).await {
            warn!("Failed to delete lock key '{}': {}", self.key, e);
        }
        self.promote_next();
    }

    /// Cleanup after a failed attempt. A session-scoped release only touches
    /// the key if our session holds it, e.g. after a put whose reply was lost.
    async fn abandon(&self, session_id: &str) {
        let options = PutOptions::release(session_id);
        if let Err(e) = self.store.put(&self.key, "", &options).await {
            debug!(
                "Session release of '{}' after failed attempt: {}",
                self.key, e
            );
        }
    }

    /// Pop the next non-expired waiter and start its attempt, or go idle
    fn promote_next(self: &Arc<Self>) {
        let next = {
            let mut state = self.state.lock();
            let next = loop {
                match state.queue.pop_front() {
                    Some(waiter) if waiter.accept() => break Some(waiter),
                    Some(_) => continue,
                    None => break None,
                }
            };
            state.active = next.clone();
            state.phase = if next.is_some() {
                Phase::Attempting
            } else {
                Phase::Idle
            };
            next
        };

        if let Some(waiter) = next {
            tokio::spawn(self.clone().attempt(waiter));
        }
    }
}

/// Proof of holding a lock; releasing it lets the next waiter in.
///
/// Only the first `release` call has an effect. A handle dropped without being
/// released schedules its release on the current runtime.
pub struct LockHandle {
    inner: Arc<Inner>,
    released: AtomicBool,
}

impl LockHandle {
    fn new(inner: Arc<Inner>) -> Self {
        Self {
            inner,
            released: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Delete the lock key and promote the next waiter
    pub async fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        // Spawned so that cancelling the caller cannot strand the queue
        let inner = self.inner.clone();
        if let Err(e) = tokio::spawn(inner.release()).await {
            warn!("Release task for '{}' failed: {}", self.inner.key, e);
        }
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!("Lock handle for '{}' dropped unreleased", self.inner.key);
                runtime.spawn(self.inner.clone().release());
            }
            Err(_) => warn!(
                "Lock handle for '{}' dropped outside a runtime, lock not released",
                self.inner.key
            ),
        }
    }
}

impl fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockHandle")
            .field("key", &self.inner.key)
            .field("released", &self.is_released())
            .finish()
    }
}
