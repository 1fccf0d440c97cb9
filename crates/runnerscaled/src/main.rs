//! runnerscaled: the runner autoscaler daemon.
//!
//! Assembles the queue snapshot client, the worker group inventory, and
//! the autoscaler, then either runs the control loop or a single tick.
//!
//! # Usage
//!
//! ```text
//! runnerscaled run  --config /etc/runnerscale/runnerscale.toml
//! runnerscaled tick --config runnerscale.toml --dry-run
//! runnerscaled query --config runnerscale.toml
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use runnerscale_autoscale::{Autoscaler, ScalingPolicy, StaticInventory};
use runnerscale_core::RunnerscaleConfig;
use runnerscale_queue::{build_queue_query, ClickHouseSource, EnvCredentials};

#[derive(Parser)]
#[command(name = "runnerscaled", about = "Runner group autoscaler", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control loop until interrupted.
    Run {
        /// Path to runnerscale.toml.
        #[arg(short, long, default_value = "runnerscale.toml")]
        config: PathBuf,

        /// Log decisions without changing any capacity.
        #[arg(long)]
        dry_run: bool,
    },
    /// Run a single tick and print the decisions as JSON.
    Tick {
        /// Path to runnerscale.toml.
        #[arg(short, long, default_value = "runnerscale.toml")]
        config: PathBuf,

        /// Log decisions without changing any capacity.
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the queue snapshot query for the configured pools.
    Query {
        /// Path to runnerscale.toml.
        #[arg(short, long, default_value = "runnerscale.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().or_else(|_| {
                tracing_subscriber::EnvFilter::try_new(
                    "info,runnerscale=debug,runnerscaled=debug",
                )
            })?,
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, dry_run } => run_loop(&config, dry_run).await,
        Command::Tick { config, dry_run } => run_once(&config, dry_run).await,
        Command::Query { config } => {
            let config = RunnerscaleConfig::from_file(&config)?;
            println!(
                "{}",
                build_queue_query(
                    &config.queue.database,
                    &config.queue.table,
                    &config.pools.known,
                    config.queue.lookback_days,
                )
            );
            Ok(())
        }
    }
}

fn build_autoscaler(config: &RunnerscaleConfig) -> anyhow::Result<Autoscaler> {
    let credentials = Arc::new(EnvCredentials::from_config(&config.queue));
    let source = ClickHouseSource::from_config(&config.queue, &config.pools.known, credentials)
        .context("initialize queue snapshot client")?;
    info!(
        database = %config.queue.database,
        table = %config.queue.table,
        lookback_days = config.queue.lookback_days,
        "queue snapshot client initialized"
    );

    let inventory = Arc::new(StaticInventory::from_config(&config.inventory));
    info!(groups = config.inventory.groups.len(), "worker group inventory loaded");

    Ok(Autoscaler::new(
        Arc::new(source),
        inventory.clone(),
        inventory,
        config.pools.known.clone(),
    )
    .with_policy(ScalingPolicy::from_config(&config.controller)))
}

fn load(path: &Path, dry_run_flag: bool) -> anyhow::Result<(RunnerscaleConfig, bool)> {
    let config = RunnerscaleConfig::from_file(path)?;
    let dry_run = dry_run_flag || config.controller.dry_run;
    info!(path = %path.display(), dry_run, pools = ?config.pools.known, "configuration loaded");
    Ok((config, dry_run))
}

async fn run_loop(path: &Path, dry_run_flag: bool) -> anyhow::Result<()> {
    let (config, dry_run) = load(path, dry_run_flag)?;
    let autoscaler = build_autoscaler(&config)?;
    let interval = config.controller.interval();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        autoscaler.run(interval, dry_run, shutdown_rx).await;
    });

    tokio::signal::ctrl_c()
        .await
        .context("install Ctrl-C handler")?;
    info!("shutdown signal received");
    stop_loop(shutdown_tx, handle).await?;

    info!("runnerscaled stopped");
    Ok(())
}

/// Signal the control loop to stop and wait for it, surfacing a panic.
async fn stop_loop(shutdown_tx: watch::Sender<bool>, handle: JoinHandle<()>) -> anyhow::Result<()> {
    let _ = shutdown_tx.send(true);
    handle.await.context("autoscaler task")
}

async fn run_once(path: &Path, dry_run_flag: bool) -> anyhow::Result<()> {
    let (config, dry_run) = load(path, dry_run_flag)?;
    let autoscaler = build_autoscaler(&config)?;

    let report = autoscaler.run_tick(dry_run).await?;
    println!("{}", serde_json::to_string_pretty(&report.to_json())?);

    let failed = report.failures().count();
    if failed > 0 {
        info!(failed, "some pools could not be evaluated");
    }
    Ok(())
}
