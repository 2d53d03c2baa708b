use anyhow::{Context, Result};
use clap::Parser;
use fleetsim::backend::HttpBackend;
use fleetsim::cli::{Cli, Commands};
use fleetsim::config::Config;
use fleetsim::fleet::Fleet;
use fleetsim::observe;
use fleetsim::shutdown::ShutdownHandler;
use fleetsim::store::DeviceStore;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Status { json } => status(config, json).await,
        Commands::Remove { device_id } => remove(config, &device_id).await,
    }
}

async fn run(config: Config) -> Result<()> {
    observe::init_tracing(&config.simulator)?;
    info!("Fleet simulator {} starting", env!("CARGO_PKG_VERSION"));
    info!("Server: {}", config.server.url);
    for warning in config.warnings() {
        warn!("{warning}");
    }

    let backend = HttpBackend::new(&config.server).context("Failed to build HTTP client")?;
    let store = DeviceStore::open(&config.simulator.database_path).await?;

    let shutdown = ShutdownHandler::new();
    let mut fleet = Fleet::new(config, store, Arc::new(backend), shutdown.signals());

    let signals = tokio::spawn(async move { shutdown.wait_for_signals().await });

    if let Err(err) = fleet.initialize().await {
        error!("Fleet initialization failed: {err:#}");
        fleet.stop().await;
        signals.abort();
        return Err(err);
    }

    fleet.start().await;
    fleet.stop().await;
    signals.abort();

    info!("Fleet simulator stopped");
    Ok(())
}

async fn status(config: Config, as_json: bool) -> Result<()> {
    let store = DeviceStore::open(&config.simulator.database_path).await?;

    let counts = store.count_by_profile().await?;
    let updating: Vec<String> = store
        .list_devices()
        .await?
        .into_iter()
        .filter(|device| device.status == models::device::DeviceStatus::Updating)
        .map(|device| device.device_id)
        .collect();
    let active = store.active_deployments().await?;
    store.close().await;

    if as_json {
        let report = json!({
            "devices": counts,
            "total": counts.values().sum::<i64>(),
            "updating": updating,
            "active_deployments": active,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Devices by profile:");
    for (profile, count) in &counts {
        println!("  {profile:<20} {count}");
    }
    println!("  {:<20} {}", "total", counts.values().sum::<i64>());

    println!("Devices updating: {}", updating.len());
    for device_id in &updating {
        println!("  {device_id}");
    }

    println!("Active deployments: {}", active.len());
    for deployment in &active {
        println!(
            "  {} {} {} {}% (since {})",
            deployment.device_id,
            deployment.deployment_id,
            deployment.status,
            deployment.progress,
            deployment.started_at.to_rfc3339()
        );
    }
    Ok(())
}

async fn remove(config: Config, device_id: &str) -> Result<()> {
    let store = DeviceStore::open(&config.simulator.database_path).await?;
    let removed = store.delete_device(device_id).await;
    store.close().await;

    if removed? {
        println!("Removed {device_id}");
        Ok(())
    } else {
        anyhow::bail!("Device {device_id} not found")
    }
}
