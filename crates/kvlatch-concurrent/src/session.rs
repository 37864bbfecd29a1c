//! Lazily created, periodically renewed session backing one coordinator
//!
//! The first call to `get_or_create` creates a session with delete-on-expire
//! behavior and starts a renewal task that fires every two thirds of the TTL.
//! Later calls return the cached id without touching the store.
//!
//! A renewal failure stops the renewal task. However the task ends, the session
//! is flagged as no longer renewed. With `RenewalFailurePolicy::Keep`
//! the cached id is still handed out afterwards; with
//! `RenewalFailurePolicy::Recreate` the next call creates a new session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use kvlatch_store::{KvStore, SessionBehavior, SessionOptions};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};

use crate::error::{LatchError, Result};
use crate::options::{LatchOptions, RenewalFailurePolicy};

struct ActiveSession {
    id: String,
    renewal_failed: Arc<AtomicBool>,
    renewal: JoinHandle<()>,
}

/// Owns the session of a single lock coordinator
pub struct SessionManager {
    store: Arc<dyn KvStore>,
    options: SessionOptions,
    renewal_period: Duration,
    policy: RenewalFailurePolicy,
    /// Set when the options failed validation; no session is ever created
    invalid: Option<String>,
    current: Mutex<Option<ActiveSession>>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn KvStore>, options: &LatchOptions) -> Self {
        let mut session_options = SessionOptions::new(options.session_ttl, SessionBehavior::Delete);
        if let Some(name) = &options.session_name {
            session_options = session_options.with_name(name.clone());
        }

        Self {
            store,
            options: session_options,
            renewal_period: options.renewal_period(),
            policy: options.renewal_failure,
            invalid: options.validate().err().map(|e| e.to_string()),
            current: Mutex::new(None),
        }
    }

    /// Return the cached session id, creating the session on first use
    pub async fn get_or_create(&self) -> Result<String> {
        if let Some(reason) = &self.invalid {
            return Err(LatchError::InvalidOptions(reason.clone()));
        }

        let mut current = self.current.lock().await;

        if let Some(active) = current.as_ref() {
            let failed = active.renewal_failed.load(Ordering::Acquire);
            if !failed || self.policy == RenewalFailurePolicy::Keep {
                return Ok(active.id.clone());
            }
            info!(
                "Session {} stopped renewing, creating a replacement",
                active.id
            );
        }

        let id = self.store.create_session(&self.options).await?;
        let renewal_failed = Arc::new(AtomicBool::new(false));
        let renewal = tokio::spawn(renew_periodically(
            self.store.clone(),
            id.clone(),
            self.renewal_period,
            renewal_failed.clone(),
        ));

        info!(
            "Created session {} (ttl={:?}, renew every {:?})",
            id, self.options.ttl, self.renewal_period
        );

        if let Some(previous) = current.replace(ActiveSession {
            id: id.clone(),
            renewal_failed,
            renewal,
        }) {
            previous.renewal.abort();
        }

        Ok(id)
    }

    /// Cached session id, if a session was created
    pub async fn session_id(&self) -> Option<String> {
        self.current.lock().await.as_ref().map(|s| s.id.clone())
    }

    /// Whether the renewal task of the current session has stopped on a failure
    pub async fn renewal_failed(&self) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| s.renewal_failed.load(Ordering::Acquire))
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(active) = self.current.get_mut().take() {
            active.renewal.abort();
        }
    }
}

/// Flags the session as unrenewed when the renewal task ends, panics included
struct RenewalStopped(Arc<AtomicBool>);

impl Drop for RenewalStopped {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

async fn renew_periodically(
    store: Arc<dyn KvStore>,
    session_id: String,
    period: Duration,
    failed: Arc<AtomicBool>,
) {
    let _stopped = RenewalStopped(failed);
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        match store.renew_session(&session_id).await {
            Ok(true) => debug!("Renewed session {}", session_id),
            Ok(false) => {
                warn!("Session {} is unknown to the store, renewal stopped", session_id);
                break;
            }
            Err(e) => {
                warn!("Failed to renew session {}: {}, renewal stopped", session_id, e);
                break;
            }
        }
    }
}
