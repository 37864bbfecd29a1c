//! Command line arguments

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "kvlatch", version, about = "Distributed locks and counters on Consul")]
pub struct Cli {
    /// Configuration file (defaults to conf/kvlatch.yml when present)
    #[arg(short = 'c', long = "config", env = "KVLATCH_CONFIG")]
    pub config: Option<PathBuf>,
    /// Consul agent address, e.g. http://127.0.0.1:8500
    #[arg(long = "address")]
    pub address: Option<String>,
    /// ACL token
    #[arg(long = "token", env = "CONSUL_HTTP_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
    #[arg(long = "log-level")]
    pub log_level: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Acquire a lock, hold it, then release it
    Lock {
        key: String,
        /// Give up after this many milliseconds (waits forever when omitted)
        #[arg(long = "timeout-ms")]
        timeout_ms: Option<u64>,
        /// How long to hold the lock before releasing it
        #[arg(long = "hold-ms", default_value_t = 0)]
        hold_ms: u64,
    },
    /// Atomic counter operations
    Counter {
        #[command(subcommand)]
        op: CounterCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum CounterCommand {
    /// Print the current value
    Get { key: String },
    /// Add a delta and print the new value
    Add {
        key: String,
        #[arg(allow_negative_numbers = true)]
        delta: i64,
    },
    /// Add one and print the new value
    Incr { key: String },
    /// Subtract one and print the new value
    Decr { key: String },
    /// Set NEW if the counter equals EXPECTED; prints true or false
    Cas {
        key: String,
        #[arg(allow_negative_numbers = true)]
        expected: i64,
        #[arg(allow_negative_numbers = true)]
        new: i64,
    },
}
