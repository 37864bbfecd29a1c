//! Polling claim loop for a lock key
//!
//! A claim is a conditional put of `LOCK_SENTINEL` bound to the session. While
//! another session holds the key, the hunter sleeps a fixed interval and tries
//! again until the deadline passes. Store errors end the hunt immediately.

use std::sync::Arc;
use std::time::Duration;

use kvlatch_store::{KvStore, PutOptions};
use tokio::time::Instant;
use tracing::debug;

use crate::error::{LatchError, Result};
use crate::options::LOCK_SENTINEL;

pub struct AcquisitionHunter {
    store: Arc<dyn KvStore>,
    key: String,
    poll_interval: Duration,
}

impl AcquisitionHunter {
    pub fn new(store: Arc<dyn KvStore>, key: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            poll_interval,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Claim the key for `session_id`, polling until `deadline` (forever when `None`)
    pub async fn try_claim(&self, session_id: &str, deadline: Option<Instant>) -> Result<()> {
        let options = PutOptions::acquire(session_id);
        let mut attempts: u64 = 0;

        loop {
            attempts += 1;
            if self.store.put(&self.key, LOCK_SENTINEL, &options).await? {
                debug!(
                    "Claimed '{}' for session {} after {} attempt(s)",
                    self.key, session_id, attempts
                );
                return Ok(());
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                debug!(
                    "Gave up on '{}' for session {} after {} attempt(s)",
                    self.key, session_id, attempts
                );
                return Err(LatchError::TimedOut);
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
