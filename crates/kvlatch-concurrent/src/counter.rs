//! Atomic 64-bit counter stored as decimal text under one key
//!
//! Every read-modify-write runs under the counter's companion lock
//! (`<key>/lock`), waiting without a deadline. An absent key counts as zero.

use std::sync::Arc;

use kvlatch_store::{KvStore, PutOptions};
use tracing::debug;

use crate::coordinator::{LockCoordinator, LockHandle};
use crate::error::{LatchError, Result};
use crate::options::{COUNTER_LOCK_SUFFIX, LatchOptions, Timeout};

#[derive(Clone)]
pub struct DistributedCounter {
    store: Arc<dyn KvStore>,
    key: String,
    lock: LockCoordinator,
}

impl DistributedCounter {
    /// Counter at `key`, guarded by a fresh coordinator on `<key>/lock`
    pub fn new(store: Arc<dyn KvStore>, key: impl Into<String>, options: &LatchOptions) -> Self {
        let key = key.into();
        let lock = LockCoordinator::new(
            store.clone(),
            format!("{}{}", key, COUNTER_LOCK_SUFFIX),
            options,
        );
        Self::with_lock(store, key, lock)
    }

    /// Counter at `key` guarded by an existing coordinator
    pub fn with_lock(store: Arc<dyn KvStore>, key: impl Into<String>, lock: LockCoordinator) -> Self {
        Self {
            store,
            key: key.into(),
            lock,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn lock(&self) -> &LockCoordinator {
        &self.lock
    }

    /// Current value, read without taking the lock
    pub async fn get(&self) -> Result<i64> {
        self.read().await
    }

    /// Add `delta` and return the previous value
    pub async fn get_and_add(&self, delta: i64) -> Result<i64> {
        let (previous, _) = self.update(delta).await?;
        Ok(previous)
    }

    /// Add `delta` and return the new value
    pub async fn add_and_get(&self, delta: i64) -> Result<i64> {
        let (_, updated) = self.update(delta).await?;
        Ok(updated)
    }

    pub async fn increment_and_get(&self) -> Result<i64> {
        self.add_and_get(1).await
    }

    pub async fn decrement_and_get(&self) -> Result<i64> {
        self.add_and_get(-1).await
    }

    pub async fn get_and_increment(&self) -> Result<i64> {
        self.get_and_add(1).await
    }

    /// Write `new_value` only if the counter currently equals `expected`
    pub async fn compare_and_set(&self, expected: i64, new_value: i64) -> Result<bool> {
        let handle = self.acquire().await?;
        let result = self.swap_if(expected, new_value).await;
        handle.release().await;
        result
    }

    async fn acquire(&self) -> Result<LockHandle> {
        self.lock.acquire(Timeout::Unbounded).await
    }

    async fn update(&self, delta: i64) -> Result<(i64, i64)> {
        let handle = self.acquire().await?;
        let result = self.apply(delta).await;
        handle.release().await;
        result
    }

    async fn apply(&self, delta: i64) -> Result<(i64, i64)> {
        let current = self.read().await?;
        let updated = current.wrapping_add(delta);
        self.write(updated).await?;
        Ok((current, updated))
    }

    async fn swap_if(&self, expected: i64, new_value: i64) -> Result<bool> {
        let current = self.read().await?;
        if current != expected {
            debug!(
                "CAS on '{}' rejected: expected {}, found {}",
                self.key, expected, current
            );
            return Ok(false);
        }
        self.write(new_value).await?;
        Ok(true)
    }

    async fn read(&self) -> Result<i64> {
        match self.store.get(&self.key).await? {
            None => Ok(0),
            Some(kv) => kv
                .value
                .parse::<i64>()
                .map_err(|source| LatchError::MalformedCounterValue {
                    key: self.key.clone(),
                    value: kv.value.clone(),
                    source,
                }),
        }
    }

    async fn write(&self, value: i64) -> Result<()> {
        let applied = self
            .store
            .put(&self.key, &value.to_string(), &PutOptions::default())
            .await?;
        if !applied {
            debug!("Store did not apply write of {} to '{}'", value, self.key);
        }
        Ok(())
    }
}
