//! fleetsyncd - Fleet position sync daemon
//!
//! Polls provider feeds and replicates new vehicle and tracker positions
//! into the record store. All providers share one store session.
//!
//! Usage:
//!   fleetsyncd --config fleetsync.toml
//!   fleetsyncd --config fleetsync.toml --once

mod config;
mod feed;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use fleetsync_engine::{Scheduler, StoreRepository, SyncProcessor};
use futures::future::join_all;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::DaemonConfig;
use crate::feed::HttpFeed;

const DEFAULT_LOG_FILTER: &str = "fleetsyncd=info,fleetsync_engine=info,fleetsync_client=info";

#[derive(Parser)]
#[command(name = "fleetsyncd")]
#[command(author, version, about = "Fleet position sync daemon")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "FLEETSYNC_CONFIG", default_value = "fleetsync.toml")]
    config: PathBuf,

    /// Run one cycle per provider, print the reports, and exit
    #[arg(long)]
    once: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Verbose logging (overrides RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_logging(cli: &Cli) {
    let filter = if cli.verbose {
        EnvFilter::new("fleetsyncd=debug,fleetsync_engine=debug,fleetsync_client=debug,fleetsync_core=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match cli.log_format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    tracing::info!("Starting fleetsyncd");
    let config = DaemonConfig::load(&cli.config)?;
    tracing::info!(
        store = %config.store.base_url,
        providers = config.providers.len(),
        max_attempts = config.sync.max_attempts,
        "Loaded config from {}",
        cli.config.display()
    );

    // One repository, so every provider shares the store session
    let repository = Arc::new(
        StoreRepository::from_config(&config.store).context("Failed to create store client")?,
    );
    let processor = Arc::new(SyncProcessor::new(repository.clone(), config.sync.clone())?);

    let mut schedulers = Vec::with_capacity(config.providers.len());
    for provider in &config.providers {
        let feed = HttpFeed::from_config(provider)
            .with_context(|| format!("Failed to create feed '{}'", provider.name))?;
        schedulers.push(Scheduler::new(
            Arc::new(feed),
            processor.clone(),
            Duration::from_secs(provider.interval_secs),
        ));
    }

    let outcome = if cli.once {
        run_once(&schedulers).await
    } else {
        run_until_shutdown(schedulers).await
    };

    if let Err(e) = repository.client().logout().await {
        tracing::warn!(error = %e, "Logout failed");
    }
    tracing::info!("fleetsyncd stopped");
    outcome
}

/// One cycle per provider; fails if any provider failed
async fn run_once(schedulers: &[Scheduler]) -> Result<()> {
    let results = join_all(schedulers.iter().map(|s| s.run_once())).await;

    let mut failed = 0;
    for (scheduler, result) in schedulers.iter().zip(results) {
        match result {
            Ok(report) => {
                let line = serde_json::json!({ "provider": scheduler.provider(), "report": report });
                println!("{}", line);
            }
            Err(e) => {
                tracing::error!(provider = %scheduler.provider(), error = %e, "Cycle failed");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} provider(s) failed", failed, schedulers.len());
    }
    Ok(())
}

/// Run every scheduler until Ctrl-C. Cycles in progress finish first.
async fn run_until_shutdown(schedulers: Vec<Scheduler>) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handles: Vec<_> = schedulers
        .into_iter()
        .map(|scheduler| tokio::spawn(scheduler.run(shutdown_rx.clone())))
        .collect();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested, waiting for running cycles");
    // receivers may all be gone already
    let _ = shutdown_tx.send(true);

    for handle in join_all(handles).await {
        if let Err(e) = handle {
            tracing::error!(error = %e, "Scheduler task panicked");
        }
    }
    Ok(())
}
