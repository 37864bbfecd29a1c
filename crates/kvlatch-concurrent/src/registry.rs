//! Per-process registry of coordinators and counters
//!
//! Two callers asking for the same key get the same `LockCoordinator`, so they
//! queue behind each other locally instead of competing through the store.

use std::sync::Arc;

use dashmap::DashMap;
use kvlatch_store::KvStore;
use tracing::debug;

use crate::coordinator::LockCoordinator;
use crate::counter::DistributedCounter;
use crate::options::{COUNTER_LOCK_SUFFIX, LatchOptions};

pub struct LatchRegistry {
    store: Arc<dyn KvStore>,
    options: LatchOptions,
    locks: DashMap<String, LockCoordinator>,
    counters: DashMap<String, DistributedCounter>,
}

impl LatchRegistry {
    pub fn new(store: Arc<dyn KvStore>, options: LatchOptions) -> Self {
        Self {
            store,
            options,
            locks: DashMap::new(),
            counters: DashMap::new(),
        }
    }

    pub fn options(&self) -> &LatchOptions {
        &self.options
    }

    /// Shared coordinator for `key`, created on first use
    pub fn lock(&self, key: &str) -> LockCoordinator {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!("Registering lock coordinator for '{}'", key);
                LockCoordinator::new(self.store.clone(), key, &self.options)
            })
            .clone()
    }

    /// Shared counter for `key`; its companion lock is also registered
    pub fn counter(&self, key: &str) -> DistributedCounter {
        if let Some(counter) = self.counters.get(key) {
            return counter.clone();
        }

        let lock = self.lock(&format!("{}{}", key, COUNTER_LOCK_SUFFIX));
        self.counters
            .entry(key.to_string())
            .or_insert_with(|| DistributedCounter::with_lock(self.store.clone(), key, lock))
            .clone()
    }
}
