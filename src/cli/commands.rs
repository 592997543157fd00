use anyhow::{bail, Result};
use std::path::PathBuf;
use tracing::info;

use crate::cli::config::Settings;
use crate::workers::{run_worker, WorkerManager, WorkerRole};

/// Seed the queues and supervise the full worker fleet until shutdown.
pub async fn run(settings: Settings, config_path: Option<PathBuf>) -> Result<()> {
    info!(
        discovery = settings.workers.discovery_workers,
        extraction = settings.workers.extraction_workers,
        repair = settings.workers.repair_workers,
        "Starting crawl"
    );

    let mut manager = WorkerManager::new(settings, config_path);
    manager.run().await
}

/// Run a single worker process of the given role.
pub async fn worker(settings: Settings, role: String, id: usize) -> Result<()> {
    let Some(role) = WorkerRole::parse(&role) else {
        bail!("unknown worker role: {role} (expected discovery, extraction or repair)");
    };

    run_worker(role, id, settings).await
}

/// Publish the configured seed URLs without starting any workers.
pub async fn seed(settings: Settings) -> Result<()> {
    let manager = WorkerManager::new(settings, None);
    let published = manager.seed().await?;
    println!("Published {published} seed tasks to the discovery queue");
    Ok(())
}

/// Show the effective configuration as YAML.
pub fn show_config(settings: Settings) -> Result<()> {
    let yaml = serde_yaml::to_string(&settings)?;
    println!("{yaml}");
    Ok(())
}
