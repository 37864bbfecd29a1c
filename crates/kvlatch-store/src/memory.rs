//! In-memory `KvStore` with Consul session semantics
//!
//! Keys and sessions live in `DashMap`s. Sessions expire lazily: every
//! operation first reaps sessions whose TTL elapsed without renewal and applies
//! their behavior to the keys they hold. Time is read from the tokio clock, so
//! tests running with a paused clock control expiry precisely.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::model::{KeyValue, PutOptions, SessionBehavior, SessionOptions};
use crate::store::KvStore;

/// Stored KV entry
#[derive(Debug, Clone)]
struct StoredKV {
    value: String,
    modify_index: u64,
    lock_index: u64,
    session: Option<String>,
}

/// Stored session with its lease deadline
#[derive(Debug, Clone)]
struct StoredSession {
    ttl: Duration,
    behavior: SessionBehavior,
    expires_at: Instant,
}

impl StoredSession {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory KV store and session registry
#[derive(Clone)]
pub struct MemoryKvStore {
    store: Arc<DashMap<String, StoredKV>>,
    sessions: Arc<DashMap<String, StoredSession>>,
    /// Global index counter
    index: Arc<AtomicU64>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            sessions: Arc::new(DashMap::new()),
            index: Arc::new(AtomicU64::new(1)),
        }
    }

    fn next_index(&self) -> u64 {
        self.index.fetch_add(1, Ordering::SeqCst)
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.reap_expired();
        self.sessions.len()
    }

    /// Session currently holding `key`, if any
    pub fn holder(&self, key: &str) -> Option<String> {
        self.reap_expired();
        self.store.get(key).and_then(|entry| entry.session.clone())
    }

    /// Invalidate a session as if its TTL had elapsed.
    /// Returns false if the session was unknown.
    pub fn invalidate_session(&self, session_id: &str) -> bool {
        match self.sessions.remove(session_id) {
            Some((_, session)) => {
                self.apply_behavior(session_id, session.behavior);
                true
            }
            None => false,
        }
    }

    fn is_live(&self, session_id: &str) -> bool {
        let now = Instant::now();
        self.sessions
            .get(session_id)
            .is_some_and(|s| !s.is_expired(now))
    }

    /// Drop expired sessions and apply their behavior to held keys
    fn reap_expired(&self) {
        let now = Instant::now();
        let expired: Vec<(String, SessionBehavior)> = self
            .sessions
            .iter()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| (entry.key().clone(), entry.behavior))
            .collect();

        for (session_id, behavior) in expired {
            if self.sessions.remove(&session_id).is_some() {
                debug!("Session {} expired, applying '{}' behavior", session_id, behavior);
                self.apply_behavior(&session_id, behavior);
            }
        }
    }

    fn apply_behavior(&self, session_id: &str, behavior: SessionBehavior) {
        match behavior {
            SessionBehavior::Delete => {
                self.store
                    .retain(|_, kv| kv.session.as_deref() != Some(session_id));
            }
            SessionBehavior::Release => {
                for mut entry in self.store.iter_mut() {
                    if entry.session.as_deref() == Some(session_id) {
                        entry.session = None;
                        entry.modify_index = self.next_index();
                    }
                }
            }
        }
    }

    fn check_session(&self, session_id: Option<&String>) -> Result<()> {
        match session_id {
            Some(id) if !self.is_live(id) => Err(StoreError::InvalidSession(id.clone())),
            _ => Ok(()),
        }
    }
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<KeyValue>> {
        self.reap_expired();
        Ok(self.store.get(key).map(|entry| KeyValue {
            key: key.to_string(),
            value: entry.value.clone(),
            modify_index: entry.modify_index,
            lock_index: entry.lock_index,
            session: entry.session.clone(),
        }))
    }

    async fn put(&self, key: &str, value: &str, options: &PutOptions) -> Result<bool> {
        self.reap_expired();
        self.check_session(options.acquire_session.as_ref())?;
        self.check_session(options.release_session.as_ref())?;

        match self.store.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let kv = occupied.get_mut();

                if let Some(cas) = options.cas_index
                    && (cas == 0 || kv.modify_index != cas)
                {
                    return Ok(false);
                }

                if let Some(session_id) = &options.acquire_session {
                    match &kv.session {
                        Some(holder) if holder != session_id => return Ok(false),
                        Some(_) => {}
                        None => {
                            kv.session = Some(session_id.clone());
                            kv.lock_index += 1;
                        }
                    }
                }

                if let Some(session_id) = &options.release_session {
                    if kv.session.as_ref() != Some(session_id) {
                        return Ok(false);
                    }
                    kv.session = None;
                }

                kv.value = value.to_string();
                kv.modify_index = self.next_index();
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                if options.cas_index.is_some_and(|cas| cas != 0)
                    || options.release_session.is_some()
                {
                    return Ok(false);
                }

                let index = self.next_index();
                let acquired = options.acquire_session.is_some();
                vacant.insert(StoredKV {
                    value: value.to_string(),
                    modify_index: index,
                    lock_index: u64::from(acquired),
                    session: options.acquire_session.clone(),
                });
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.reap_expired();
        self.store.remove(key);
        Ok(())
    }

    async fn create_session(&self, options: &SessionOptions) -> Result<String> {
        self.reap_expired();
        let session_id = Uuid::new_v4().to_string();
        self.sessions.insert(
            session_id.clone(),
            StoredSession {
                ttl: options.ttl,
                behavior: options.behavior,
                expires_at: Instant::now() + options.ttl,
            },
        );
        debug!(
            "Created session {} (ttl={:?}, behavior={})",
            session_id, options.ttl, options.behavior
        );
        Ok(session_id)
    }

    async fn renew_session(&self, session_id: &str) -> Result<bool> {
        self.reap_expired();
        match self.sessions.get_mut(session_id) {
            Some(mut session) => {
                session.expires_at = Instant::now() + session.ttl;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
