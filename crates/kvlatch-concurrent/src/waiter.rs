//! Pending acquisition requests
//!
//! A waiter is decided exactly once: either the coordinator accepts it (it
//! becomes the active attempt) or its timer expires it. Both transitions run
//! under the waiter's own mutex, so a waiter that was accepted can no longer
//! expire and an expired waiter is never offered the lock.
//!
//! Accepting a waiter also aborts its timer, so a promoted waiter is not kept
//! alive until a deadline that no longer matters.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::coordinator::LockHandle;
use crate::error::{LatchError, Result};

/// Where a waiter stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaiterState {
    Pending,
    Accepted,
    Expired,
}

type OutcomeSender = oneshot::Sender<Result<LockHandle>>;

struct WaiterInner {
    state: WaiterState,
    outcome: Option<OutcomeSender>,
    timer: Option<AbortHandle>,
}

/// One in-process request for the lock
pub struct Waiter {
    deadline: Option<Instant>,
    inner: Mutex<WaiterInner>,
}

impl Waiter {
    pub(crate) fn new(deadline: Option<Instant>) -> (Arc<Self>, oneshot::Receiver<Result<LockHandle>>) {
        let (tx, rx) = oneshot::channel();
        let waiter = Arc::new(Self {
            deadline,
            inner: Mutex::new(WaiterInner {
                state: WaiterState::Pending,
                outcome: Some(tx),
                timer: None,
            }),
        });
        (waiter, rx)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn state(&self) -> WaiterState {
        self.inner.lock().state
    }

    /// Attach the task that will expire this waiter at its deadline.
    /// A waiter that was already accepted aborts it straight away.
    pub(crate) fn set_timer(&self, timer: AbortHandle) {
        let mut inner = self.inner.lock();
        match inner.state {
            WaiterState::Pending => inner.timer = Some(timer),
            WaiterState::Accepted => timer.abort(),
            WaiterState::Expired => {}
        }
    }

    /// Offer the lock to this waiter. Returns false if it already expired.
    pub fn accept(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            WaiterState::Pending => {
                inner.state = WaiterState::Accepted;
                if let Some(timer) = inner.timer.take() {
                    timer.abort();
                }
                true
            }
            WaiterState::Accepted => true,
            WaiterState::Expired => false,
        }
    }

    /// Timer path. Expires a pending waiter and delivers `TimedOut` to it.
    /// Returns false if the waiter was already decided.
    pub fn expire(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != WaiterState::Pending {
            return false;
        }
        inner.state = WaiterState::Expired;
        inner.timer = None;
        if let Some(tx) = inner.outcome.take() {
            let _ = tx.send(Err(LatchError::TimedOut));
        }
        true
    }

    /// Deliver the outcome of this waiter's attempt.
    /// Hands the outcome back if nobody is listening any more.
    pub(crate) fn deliver(&self, outcome: Result<LockHandle>) -> Option<Result<LockHandle>> {
        let tx = self.inner.lock().outcome.take();
        match tx {
            Some(tx) => tx.send(outcome).err(),
            None => Some(outcome),
        }
    }
}
