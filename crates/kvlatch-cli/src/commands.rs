//! Command execution against a `LatchRegistry`

use std::time::Duration;

use anyhow::Context;
use kvlatch_concurrent::{LatchRegistry, Timeout};
use tracing::info;

use crate::cli::{Command, CounterCommand};

/// Run one command and return what should be printed
pub async fn run(registry: &LatchRegistry, command: Command) -> anyhow::Result<String> {
    match command {
        Command::Lock {
            key,
            timeout_ms,
            hold_ms,
        } => lock(registry, &key, timeout_ms, hold_ms).await,
        Command::Counter { op } => counter(registry, op).await,
    }
}

async fn lock(
    registry: &LatchRegistry,
    key: &str,
    timeout_ms: Option<u64>,
    hold_ms: u64,
) -> anyhow::Result<String> {
    let timeout = Timeout::from(timeout_ms.map(Duration::from_millis));
    let handle = registry
        .lock(key)
        .acquire(timeout)
        .await
        .with_context(|| format!("failed to acquire lock '{}'", key))?;
    info!("Acquired lock '{}', holding for {} ms", key, hold_ms);

    tokio::time::sleep(Duration::from_millis(hold_ms)).await;
    handle.release().await;
    info!("Released lock '{}'", key);

    Ok(format!("held '{}' for {} ms", key, hold_ms))
}

async fn counter(registry: &LatchRegistry, op: CounterCommand) -> anyhow::Result<String> {
    let output = match op {
        CounterCommand::Get { key } => registry.counter(&key).get().await?.to_string(),
        CounterCommand::Add { key, delta } => {
            registry.counter(&key).add_and_get(delta).await?.to_string()
        }
        CounterCommand::Incr { key } => {
            registry.counter(&key).increment_and_get().await?.to_string()
        }
        CounterCommand::Decr { key } => {
            registry.counter(&key).decrement_and_get().await?.to_string()
        }
        CounterCommand::Cas { key, expected, new } => registry
            .counter(&key)
            .compare_and_set(expected, new)
            .await?
            .to_string(),
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use kvlatch_concurrent::LatchOptions;
    use kvlatch_store::{KvStore, MemoryKvStore, PutOptions};

    fn registry(store: &MemoryKvStore) -> LatchRegistry {
        LatchRegistry::new(Arc::new(store.clone()), LatchOptions::default())
    }

    fn get(key: &str) -> Command {
        Command::Counter {
            op: CounterCommand::Get { key: key.to_string() },
        }
    }

    #[tokio::test]
    async fn test_counter_commands() {
        let store = MemoryKvStore::new();
        let registry = registry(&store);

        assert_eq!(run(&registry, get("hits")).await.unwrap(), "0");

        let add = Command::Counter {
            op: CounterCommand::Add {
                key: "hits".to_string(),
                delta: 5,
            },
        };
        assert_eq!(run(&registry, add).await.unwrap(), "5");

        let decr = Command::Counter {
            op: CounterCommand::Decr {
                key: "hits".to_string(),
            },
        };
        assert_eq!(run(&registry, decr).await.unwrap(), "4");

        let cas = |expected, new| Command::Counter {
            op: CounterCommand::Cas {
                key: "hits".to_string(),
                expected,
                new,
            },
        };
        assert_eq!(run(&registry, cas(1, 2)).await.unwrap(), "false");
        assert_eq!(run(&registry, cas(4, 9)).await.unwrap(), "true");

        let incr = Command::Counter {
            op: CounterCommand::Incr {
                key: "hits".to_string(),
            },
        };
        assert_eq!(run(&registry, incr).await.unwrap(), "10");
    }

    #[tokio::test]
    async fn test_malformed_counter_is_an_error() {
        let store = MemoryKvStore::new();
        store.put("hits", "n/a", &PutOptions::default()).await.unwrap();

        assert!(run(&registry(&store), get("hits")).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_command() {
        let store = MemoryKvStore::new();
        let registry = registry(&store);

        let command = Command::Lock {
            key: "jobs".to_string(),
            timeout_ms: Some(100),
            hold_ms: 1000,
        };
        assert_eq!(
            run(&registry, command).await.unwrap(),
            "held 'jobs' for 1000 ms"
        );
        assert!(store.get("jobs").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_command_times_out() {
        let store = MemoryKvStore::new();
        let registry = registry(&store);
        let held = registry
            .lock("jobs")
            .acquire(Timeout::Unbounded)
            .await
            .unwrap();

        let command = Command::Lock {
            key: "jobs".to_string(),
            timeout_ms: Some(100),
            hold_ms: 0,
        };
        let err = run(&registry, command).await.unwrap_err();
        assert!(format!("{:#}", err).contains("timed out waiting to get lock"));

        held.release().await;
    }
}
