use anyhow::{Context, Result};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{error, info, warn};

use crate::cli::config::Settings;
use crate::crawler::classify::LinkClassifier;
use crate::crawler::task::Task;
use crate::storage::{Broker, RedisBroker};
use crate::workers::WorkerRole;

/// Spawns and supervises the worker processes, one OS process per worker,
/// by re-invoking the current executable with the `worker` subcommand.
pub struct WorkerManager {
    settings: Settings,
    /// Forwarded to children so every process reads the same file.
    config_path: Option<PathBuf>,
    children: Vec<(WorkerRole, usize, Child)>,
}

impl WorkerManager {
    pub fn new(settings: Settings, config_path: Option<PathBuf>) -> Self {
        Self { settings, config_path, children: Vec::new() }
    }

    /// Publish the configured seed URLs into the discovery queue at the
    /// broker's top priority. Idempotent enough in practice: the frontier
    /// dedupes links, and re-crawling a league page is cheap.
    pub async fn seed(&self) -> Result<usize> {
        let broker = RedisBroker::connect(&self.settings.broker).await?;
        let classifier = LinkClassifier::new();

        let mut published = 0usize;
        for seed in &self.settings.seeds {
            let kind = classifier.classify(seed);
            let task = Task::new(seed, kind, self.settings.broker.max_priority)
                .with_metadata("seed", json!(true));
            let priority = task.priority;
            broker
                .publish(&self.settings.broker.discovery_queue, serde_json::to_value(&task)?, priority)
                .await?;
            info!(url = %seed, kind = %kind, "Seed published");
            published += 1;
        }

        Ok(published)
    }

    /// Seed, spawn the configured worker pools, then supervise until a
    /// shutdown signal arrives.
    pub async fn run(&mut self) -> Result<()> {
        let seeded = self.seed().await?;
        info!(seeded, "Seeding complete");

        self.spawn_pool(WorkerRole::Discovery, self.settings.workers.discovery_workers)?;
        self.spawn_pool(WorkerRole::Extraction, self.settings.workers.extraction_workers)?;
        self.spawn_pool(WorkerRole::Repair, self.settings.workers.repair_workers)?;
        info!(workers = self.children.len(), "Worker pools running");

        let broker: Arc<dyn Broker> = Arc::new(RedisBroker::connect(&self.settings.broker).await?);
        let queues = [
            self.settings.broker.discovery_queue.clone(),
            self.settings.broker.extraction_queue.clone(),
            self.settings.broker.repair_queue.clone(),
        ];

        let mut stats = tokio::time::interval(Duration::from_secs(30));
        stats.tick().await;

        loop {
            tokio::select! {
                _ = super::wait_for_shutdown_signal() => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = stats.tick() => {
                    for queue in &queues {
                        match broker.depth(queue).await {
                            Ok(depth) => info!(queue = %queue, depth, "Queue depth"),
                            Err(e) => warn!(queue = %queue, error = %e, "Depth check failed"),
                        }
                    }
                    self.reap_exited();
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    fn spawn_pool(&mut self, role: WorkerRole, count: usize) -> Result<()> {
        let exe = std::env::current_exe().context("Failed to locate the current executable")?;

        for id in 0..count {
            let mut command = Command::new(&exe);
            command
                .arg("worker")
                .arg("--role")
                .arg(role.as_str())
                .arg("--id")
                .arg(id.to_string());
            if let Some(path) = &self.config_path {
                command.arg("--config").arg(path);
            }

            let child = command
                .kill_on_drop(true)
                .spawn()
                .context(format!("Failed to spawn {role} worker {id}"))?;

            info!(role = %role, id, pid = child.id(), "Worker spawned");
            self.children.push((role, id, child));
        }

        Ok(())
    }

    /// Log and drop children that exited on their own.
    fn reap_exited(&mut self) {
        self.children.retain_mut(|(role, id, child)| match child.try_wait() {
            Ok(Some(status)) => {
                warn!(role = %role, id, %status, "Worker exited unexpectedly");
                false
            }
            Ok(None) => true,
            Err(e) => {
                error!(role = %role, id, error = %e, "Failed to poll worker");
                true
            }
        });
    }

    /// Two-phase stop: SIGTERM every child so consumers drain, then force
    /// kill whatever is still alive after the grace period.
    async fn shutdown(&mut self) {
        for (role, id, child) in &self.children {
            if let Some(pid) = child.id() {
                info!(role = %role, id, pid, "Stopping worker");
                // SAFETY: pid comes from a child we spawned and still own.
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }
            }
        }

        let grace = Duration::from_secs(self.settings.workers.shutdown_grace_secs);
        for (role, id, child) in &mut self.children {
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(status)) => info!(role = %role, id, %status, "Worker stopped"),
                Ok(Err(e)) => error!(role = %role, id, error = %e, "Wait on worker failed"),
                Err(_) => {
                    warn!(role = %role, id, "Worker ignored SIGTERM, killing");
                    if let Err(e) = child.start_kill() {
                        error!(role = %role, id, error = %e, "Force kill failed");
                    }
                    let _ = child.wait().await;
                }
            }
        }

        self.children.clear();
        info!("All workers stopped");
    }
}
