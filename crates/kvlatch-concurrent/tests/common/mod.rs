//! Common test utilities for lock and counter integration tests
//!
//! - `FaultyStore`: wraps `MemoryKvStore`, counts plain writes and injects failures
//! - `fast_options`: coordinator options with a short poll interval

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use kvlatch_concurrent::LatchOptions;
use kvlatch_store::error::Result;
use kvlatch_store::{KeyValue, KvStore, MemoryKvStore, PutOptions, SessionOptions, StoreError};

/// Poll interval used by tests that contend across coordinators
pub const FAST_POLL: Duration = Duration::from_millis(1);

#[allow(dead_code)]
pub fn fast_options() -> LatchOptions {
    LatchOptions::default().with_poll_interval(FAST_POLL)
}

fn injected(what: &str) -> StoreError {
    StoreError::Status {
        status: 500,
        body: format!("injected {} failure", what),
    }
}

/// In-memory store with switchable faults
#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryKvStore,
    plain_writes: AtomicUsize,
    fail_gets: AtomicBool,
    fail_plain_writes: AtomicBool,
    fail_sessions: AtomicBool,
}

#[allow(dead_code)]
impl FaultyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of unconditional puts seen so far, failed ones included
    pub fn plain_writes(&self) -> usize {
        self.plain_writes.load(Ordering::SeqCst)
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn fail_plain_writes(&self, fail: bool) {
        self.fail_plain_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sessions(&self, fail: bool) {
        self.fail_sessions.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl KvStore for FaultyStore {
    async fn get(&self, key: &str) -> Result<Option<KeyValue>> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(injected("get"));
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str, options: &PutOptions) -> Result<bool> {
        if options.is_plain() {
            self.plain_writes.fetch_add(1, Ordering::SeqCst);
            if self.fail_plain_writes.load(Ordering::SeqCst) {
                return Err(injected("put"));
            }
        }
        self.inner.put(key, value, options).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }

    async fn create_session(&self, options: &SessionOptions) -> Result<String> {
        if self.fail_sessions.load(Ordering::SeqCst) {
            return Err(injected("session"));
        }
        self.inner.create_session(options).await
    }

    async fn renew_session(&self, session_id: &str) -> Result<bool> {
        self.inner.renew_session(session_id).await
    }
}
