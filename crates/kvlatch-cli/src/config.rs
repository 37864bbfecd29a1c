//! Configuration loading for the kvlatch binary
//!
//! Sources, lowest precedence first: the YAML file, `KVLATCH_*` environment
//! variables (`__` separates nesting levels), then command line flags.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use config::{Config, Environment, File};
use kvlatch_concurrent::{LatchOptions, RenewalFailurePolicy};
use kvlatch_concurrent::options::{DEFAULT_POLL_INTERVAL, DEFAULT_SESSION_TTL};
use kvlatch_store::ConsulClientConfig;
use kvlatch_store::constants::{
    CONSUL_SESSION_TTL_MAX, CONSUL_SESSION_TTL_MIN, DEFAULT_CONSUL_ADDRESS,
};

use crate::cli::Cli;

pub const DEFAULT_CONFIG_FILE: &str = "conf/kvlatch.yml";
pub const ENV_PREFIX: &str = "KVLATCH";

pub const CONSUL_ADDRESS: &str = "consul.address";
pub const CONSUL_TOKEN: &str = "consul.token";
pub const CONSUL_DATACENTER: &str = "consul.datacenter";
pub const CONSUL_CONNECT_TIMEOUT_MS: &str = "consul.connect_timeout_ms";
pub const CONSUL_READ_TIMEOUT_MS: &str = "consul.read_timeout_ms";
pub const LOCK_SESSION_TTL: &str = "lock.session_ttl";
pub const LOCK_POLL_INTERVAL: &str = "lock.poll_interval";
pub const LOCK_RECREATE_SESSION: &str = "lock.recreate_session";
pub const LOCK_SESSION_NAME: &str = "lock.session_name";
pub const LOG_LEVEL: &str = "log.level";

/// Resolved configuration
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load file, environment and command line overrides
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let file = match &cli.config {
            Some(path) => File::from(path.as_path()).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let mut builder = Config::builder().add_source(file).add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(v) = &cli.address {
            builder = builder.set_override(CONSUL_ADDRESS, v.as_str())?;
        }
        if let Some(v) = &cli.token {
            builder = builder.set_override(CONSUL_TOKEN, v.as_str())?;
        }
        if let Some(v) = &cli.log_level {
            builder = builder.set_override(LOG_LEVEL, v.as_str())?;
        }

        let config = builder
            .build()
            .context("failed to build configuration")?;
        Ok(Self { config })
    }

    /// Load a single file, without environment or overrides
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path))
            .build()
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(Self { config })
    }

    // ========================================================================
    // Consul
    // ========================================================================

    pub fn consul_address(&self) -> String {
        self.config
            .get_string(CONSUL_ADDRESS)
            .unwrap_or(DEFAULT_CONSUL_ADDRESS.to_string())
    }

    pub fn consul_token(&self) -> Option<String> {
        self.config
            .get_string(CONSUL_TOKEN)
            .ok()
            .filter(|t| !t.is_empty())
    }

    pub fn consul_datacenter(&self) -> Option<String> {
        self.config
            .get_string(CONSUL_DATACENTER)
            .ok()
            .filter(|dc| !dc.is_empty())
    }

    pub fn consul_client_config(&self) -> ConsulClientConfig {
        let defaults = ConsulClientConfig::default();
        let connect_ms = self
            .config
            .get_int(CONSUL_CONNECT_TIMEOUT_MS)
            .map(|v| v as u64)
            .unwrap_or(defaults.connect_timeout_ms);
        let read_ms = self
            .config
            .get_int(CONSUL_READ_TIMEOUT_MS)
            .map(|v| v as u64)
            .unwrap_or(defaults.read_timeout_ms);

        let mut client_config =
            ConsulClientConfig::new(&self.consul_address()).with_timeouts(connect_ms, read_ms);
        if let Some(token) = self.consul_token() {
            client_config = client_config.with_token(&token);
        }
        if let Some(dc) = self.consul_datacenter() {
            client_config = client_config.with_datacenter(&dc);
        }
        client_config
    }

    // ========================================================================
    // Lock
    // ========================================================================

    pub fn session_ttl(&self) -> anyhow::Result<Duration> {
        self.duration(LOCK_SESSION_TTL, DEFAULT_SESSION_TTL)
    }

    pub fn poll_interval(&self) -> anyhow::Result<Duration> {
        self.duration(LOCK_POLL_INTERVAL, DEFAULT_POLL_INTERVAL)
    }

    pub fn recreate_session(&self) -> bool {
        self.config.get_bool(LOCK_RECREATE_SESSION).unwrap_or(false)
    }

    /// Lock options, checked against Consul's session TTL range
    pub fn latch_options(&self) -> anyhow::Result<LatchOptions> {
        let policy = if self.recreate_session() {
            RenewalFailurePolicy::Recreate
        } else {
            RenewalFailurePolicy::Keep
        };

        let mut options = LatchOptions::default()
            .with_session_ttl(self.session_ttl()?)
            .with_poll_interval(self.poll_interval()?)
            .with_renewal_failure(policy);
        if let Ok(name) = self.config.get_string(LOCK_SESSION_NAME) {
            options = options.with_session_name(&name);
        }

        options
            .validate()
            .with_context(|| format!("invalid {} or {}", LOCK_SESSION_TTL, LOCK_POLL_INTERVAL))?;
        if !(CONSUL_SESSION_TTL_MIN..=CONSUL_SESSION_TTL_MAX).contains(&options.session_ttl) {
            bail!(
                "{} must be between {:?} and {:?}, got {:?}",
                LOCK_SESSION_TTL,
                CONSUL_SESSION_TTL_MIN,
                CONSUL_SESSION_TTL_MAX,
                options.session_ttl
            );
        }
        Ok(options)
    }

    // ========================================================================
    // Logging
    // ========================================================================

    pub fn log_level(&self) -> String {
        self.config
            .get_string(LOG_LEVEL)
            .unwrap_or("info".to_string())
    }

    fn duration(&self, key: &str, default: Duration) -> anyhow::Result<Duration> {
        match self.config.get_string(key) {
            Ok(raw) => parse_duration(&raw)
                .ok_or_else(|| anyhow!("invalid duration for {}: '{}'", key, raw)),
            Err(_) => Ok(default),
        }
    }
}

/// Parse "10ms", "100s", "5m", "1h"; a bare number is seconds
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (num_str, multiplier) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, 1u64)
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, 1000u64)
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, 60_000u64)
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, 3_600_000u64)
    } else {
        (s, 1000u64)
    };

    num_str
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .map(Duration::from_millis)
}
