//! Value and option types exchanged with a `KvStore`

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A single key as returned by `KvStore::get`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    /// Decoded value text
    pub value: String,
    pub modify_index: u64,
    /// Number of times the key has been acquired by a session
    pub lock_index: u64,
    /// Session currently holding the key, if any
    pub session: Option<String>,
}

/// Conditions attached to a `KvStore::put`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Claim the key for this session; fails if another live session holds it
    pub acquire_session: Option<String>,
    /// Give up the key; only succeeds if this session holds it
    pub release_session: Option<String>,
    /// Check-and-set index; `0` means "only if absent"
    pub cas_index: Option<u64>,
}

impl PutOptions {
    pub fn acquire(session_id: impl Into<String>) -> Self {
        Self {
            acquire_session: Some(session_id.into()),
            ..Default::default()
        }
    }

    pub fn release(session_id: impl Into<String>) -> Self {
        Self {
            release_session: Some(session_id.into()),
            ..Default::default()
        }
    }

    pub fn cas(index: u64) -> Self {
        Self {
            cas_index: Some(index),
            ..Default::default()
        }
    }

    pub fn is_plain(&self) -> bool {
        self.acquire_session.is_none() && self.release_session.is_none() && self.cas_index.is_none()
    }
}

/// What happens to the keys a session holds when the session is invalidated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBehavior {
    /// Held keys stay, their holder is cleared
    #[default]
    Release,
    /// Held keys are deleted
    Delete,
}

impl SessionBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionBehavior::Release => "release",
            SessionBehavior::Delete => "delete",
        }
    }
}

impl fmt::Display for SessionBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for `KvStore::create_session`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub name: Option<String>,
    pub ttl: Duration,
    pub behavior: SessionBehavior,
    pub lock_delay: Option<Duration>,
}

impl SessionOptions {
    pub fn new(ttl: Duration, behavior: SessionBehavior) -> Self {
        Self {
            name: None,
            ttl,
            behavior,
            lock_delay: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_lock_delay(mut self, lock_delay: Duration) -> Self {
        self.lock_delay = Some(lock_delay);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_options_constructors() {
        let opts = PutOptions::acquire("s1");
        assert_eq!(opts.acquire_session.as_deref(), Some("s1"));
        assert!(opts.release_session.is_none());
        assert!(!opts.is_plain());

        let opts = PutOptions::cas(0);
        assert_eq!(opts.cas_index, Some(0));

        assert!(PutOptions::default().is_plain());
    }

    #[test]
    fn test_session_behavior_serialization() {
        assert_eq!(
            serde_json::to_string(&SessionBehavior::Delete).unwrap(),
            "\"delete\""
        );
        assert_eq!(SessionBehavior::Release.to_string(), "release");
    }
}
