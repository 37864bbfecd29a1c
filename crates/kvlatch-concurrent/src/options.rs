//! Tunables shared by coordinators, counters and the registry

use std::time::Duration;

use tokio::time::Instant;

use crate::error::{LatchError, Result};

/// Session TTL used when none is configured
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(100);

/// Shortest session TTL accepted; renewal runs every two thirds of it
pub const MIN_SESSION_TTL: Duration = Duration::from_secs(1);

/// Pause between two claim attempts on a held key
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Value written to a lock key when claiming it
pub const LOCK_SENTINEL: &str = "*";

/// Appended to a counter key to form its companion lock key
pub const COUNTER_LOCK_SUFFIX: &str = "/lock";

/// What a coordinator does with its session after a renewal fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenewalFailurePolicy {
    /// Keep handing out the cached session id; renewal is not restarted.
    #[default]
    Keep,
    /// Create a fresh session on the next acquisition attempt.
    Recreate,
}

/// How long an acquisition may wait for the lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    Unbounded,
    After(Duration),
}

impl Timeout {
    /// Absolute deadline for a request issued at `start`.
    /// A wait too long to represent as an instant is unbounded.
    pub fn deadline_from(&self, start: Instant) -> Option<Instant> {
        match self {
            Timeout::Unbounded => None,
            Timeout::After(wait) => start.checked_add(*wait),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(value: Duration) -> Self {
        Timeout::After(value)
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(value: Option<Duration>) -> Self {
        value.map_or(Timeout::Unbounded, Timeout::After)
    }
}

/// Options for coordinators created by this crate
#[derive(Clone, Debug)]
pub struct LatchOptions {
    /// TTL of the session backing each coordinator
    pub session_ttl: Duration,
    /// Fixed pause between claim attempts
    pub poll_interval: Duration,
    pub renewal_failure: RenewalFailurePolicy,
    /// Name given to created sessions
    pub session_name: Option<String>,
}

impl Default for LatchOptions {
    fn default() -> Self {
        Self {
            session_ttl: DEFAULT_SESSION_TTL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            renewal_failure: RenewalFailurePolicy::Keep,
            session_name: None,
        }
    }
}

impl LatchOptions {
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_renewal_failure(mut self, policy: RenewalFailurePolicy) -> Self {
        self.renewal_failure = policy;
        self
    }

    pub fn with_session_name(mut self, name: &str) -> Self {
        self.session_name = Some(name.to_string());
        self
    }

    /// Sessions are renewed every two thirds of their TTL
    pub fn renewal_period(&self) -> Duration {
        self.session_ttl * 2 / 3
    }

    /// Reject a TTL below `MIN_SESSION_TTL` and a zero poll interval
    pub fn validate(&self) -> Result<()> {
        if self.session_ttl < MIN_SESSION_TTL {
            return Err(LatchError::InvalidOptions(format!(
                "session TTL {:?} is below the minimum of {:?}",
                self.session_ttl, MIN_SESSION_TTL
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(LatchError::InvalidOptions(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
