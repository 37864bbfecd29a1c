//! kvlatch-store - the KV/session collaborator behind kvlatch
//!
//! This crate provides:
//! - `KvStore`: the async contract (get, conditional put, delete, session create/renew)
//! - `MemoryKvStore`: in-process store honouring session semantics
//! - `ConsulKvClient`: HTTP backend for a Consul agent

pub mod config;
pub mod constants;
pub mod consul;
pub mod error;
pub mod memory;
pub mod model;
pub mod store;

pub use config::ConsulClientConfig;
pub use consul::ConsulKvClient;
pub use error::StoreError;
pub use memory::MemoryKvStore;
pub use model::{KeyValue, PutOptions, SessionBehavior, SessionOptions};
pub use store::KvStore;
