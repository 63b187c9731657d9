mod cli;

use clap::Parser;
use cli::{Cli, Commands, ConfigArgs};
use pincast::config::{Config, ConfigError};
use pincast::http::HttpConfig;
use pincast::observability::Metrics;
use pincast::server;
use pincast::storage::{self, KuboClient, StorageNode};
use pincast::worker::{Worker, WorkerConfig, runner};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

type AnyError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(load_config(&args)?).await?,
        Commands::Status(args) => status(load_config(&args)?).await?,
    }

    Ok(())
}

fn load_config(args: &ConfigArgs) -> Result<Config, ConfigError> {
    match &args.config {
        Some(path) => Config::load_with(path.clone()),
        None => Config::load(),
    }
}

async fn run(config: Config) -> Result<(), AnyError> {
    let metrics = Arc::new(Metrics::new());
    let worker = Worker::from_config(&config, metrics.clone())?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        server::shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let metrics_server = config.telemetry.metrics_enabled.then(|| {
        let address = config.telemetry.metrics_addr;
        let shutdown = shutdown_rx.clone();
        let metrics = metrics.clone();
        let node = worker.node();
        tokio::spawn(async move {
            if let Err(e) = server::run(address, metrics, node, shutdown).await {
                error!(%address, error = %e, "Metrics server failed");
            }
        })
    });

    info!(
        node = %config.node.api_url,
        coordinator = %config.coordinator.base_url,
        email = %config.coordinator.email,
        "Starting pincast"
    );
    runner::run(&worker, WorkerConfig::from(&config.schedule), shutdown_rx).await;

    if let Some(handle) = metrics_server {
        handle.await?;
    }

    Ok(())
}

async fn status(config: Config) -> Result<(), AnyError> {
    let node = KuboClient::new(
        &config.node.api_url,
        &HttpConfig::with_timeout(config.node.timeout()),
    )?;

    let status = storage::node_status(&node).await?;
    println!("Node:     {}", status.identity);
    println!("Version:  {}", status.software_version);
    println!("Online:   {}", status.online);
    println!("Peers:    {}", status.peer_count);

    let usage = node.repo_stats().await?;
    println!(
        "Repo:     {} of {} bytes used, {} objects",
        usage.used_bytes, usage.capacity_bytes, usage.object_count
    );

    Ok(())
}
