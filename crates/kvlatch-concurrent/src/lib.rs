//! kvlatch-concurrent - distributed locks and counters over a `KvStore`
//!
//! This crate provides:
//! - `LockCoordinator`: serializes local callers on one lock key and claims the
//!   key through a renewable session, so processes exclude each other too
//! - `DistributedCounter`: a signed 64-bit counter made atomic by a companion lock
//! - `LatchRegistry`: one shared coordinator/counter per key within a process
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use kvlatch_concurrent::{LatchOptions, LockCoordinator};
//! use kvlatch_store::MemoryKvStore;
//!
//! let lock = LockCoordinator::new(Arc::new(MemoryKvStore::new()), "jobs/lock", &LatchOptions::default());
//! let handle = lock.acquire(Duration::from_secs(5)).await?;
//! // critical section
//! handle.release().await;
//! ```

pub mod coordinator;
pub mod counter;
pub mod error;
pub mod hunter;
pub mod options;
pub mod registry;
pub mod session;
pub mod waiter;

pub use coordinator::{LockCoordinator, LockHandle, Phase};
pub use counter::DistributedCounter;
pub use error::{LatchError, Result};
pub use options::{LatchOptions, RenewalFailurePolicy, Timeout};
pub use registry::LatchRegistry;
pub use waiter::WaiterState;
