//! kvlatch - command line client for distributed locks and counters on Consul

mod cli;
mod commands;
mod config;
mod logging;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use kvlatch_concurrent::LatchRegistry;
use kvlatch_store::{ConsulKvClient, KvStore};
use tracing::debug;

use crate::cli::Cli;
use crate::config::Configuration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let configuration = Configuration::load(&cli)?;
    logging::init(&configuration.log_level())?;

    let client_config = configuration.consul_client_config();
    debug!("Using Consul agent at {}", client_config.address);
    let store: Arc<dyn KvStore> =
        Arc::new(ConsulKvClient::new(client_config).context("failed to create Consul client")?);
    let registry = LatchRegistry::new(store, configuration.latch_options()?);

    let output = commands::run(&registry, cli.command).await?;
    println!("{}", output);
    Ok(())
}
