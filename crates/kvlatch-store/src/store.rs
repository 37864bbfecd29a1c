//! The KV/session collaborator contract

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{KeyValue, PutOptions, SessionOptions};

/// Remote key/value store with renewable sessions.
///
/// A key written with `PutOptions::acquire` is considered held for as long as
/// the acquiring session stays alive. Implementations must be safe to share
/// between tasks.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Read a key. `Ok(None)` means the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<KeyValue>>;

    /// Write a key, subject to `options`. Returns whether the write was applied.
    async fn put(&self, key: &str, value: &str, options: &PutOptions) -> Result<bool>;

    /// Delete a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Create a session and return its identifier.
    async fn create_session(&self, options: &SessionOptions) -> Result<String>;

    /// Renew a session. `Ok(false)` means the store no longer knows it.
    async fn renew_session(&self, session_id: &str) -> Result<bool>;
}
