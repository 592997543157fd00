pub mod discovery;
pub mod extraction;
pub mod repair;
pub mod supervisor;

use anyhow::{Context, Result};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

use crate::cli::config::Settings;
use crate::storage::{Broker, RedisBroker};

pub use supervisor::WorkerManager;

/// Worker roles, matching the queue each consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerRole {
    Discovery,
    Extraction,
    Repair,
}

impl WorkerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerRole::Discovery => "discovery",
            WorkerRole::Extraction => "extraction",
            WorkerRole::Repair => "repair",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "discovery" => Some(WorkerRole::Discovery),
            "extraction" => Some(WorkerRole::Extraction),
            "repair" => Some(WorkerRole::Repair),
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Poll a queue and feed deliveries through the handler until shutdown.
///
/// A handler `Ok` acks the delivery; an `Err` rejects it for redelivery, so
/// handlers must absorb permanent failures themselves (persist, route to
/// repair) and reserve `Err` for transient conditions worth retrying.
///
/// The prefetch semaphore is shared by every consumer of the process and
/// bounds how many deliveries it holds un-acked at once.
pub async fn consume<H, Fut>(
    broker: Arc<dyn Broker>,
    queue: String,
    poll_interval: Duration,
    prefetch: Arc<Semaphore>,
    mut shutdown: watch::Receiver<bool>,
    handler: H,
) -> Result<()>
where
    H: Fn(Value) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    loop {
        if *shutdown.borrow() {
            break;
        }

        let permit = Arc::clone(&prefetch)
            .acquire_owned()
            .await
            .context("Prefetch semaphore closed")?;

        let delivery = match broker.fetch(&queue).await {
            Ok(delivery) => delivery,
            Err(e) => {
                error!(queue = %queue, error = %e, "Broker fetch failed, backing off");
                drop(permit);
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            }
        };

        match delivery {
            Some(delivery) => {
                let body = delivery.body().clone();
                let settled = match handler(body).await {
                    Ok(()) => broker.ack(&queue, &delivery).await,
                    Err(e) => {
                        warn!(queue = %queue, error = %e, "Handler failed, requeueing delivery");
                        broker.reject(&queue, &delivery).await
                    }
                };
                drop(permit);
                // An unsettled delivery stays in the processing set and is
                // redelivered by `recover`; the slot keeps consuming.
                if let Err(e) = settled {
                    error!(queue = %queue, error = %e, "Broker settle failed, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
            None => {
                debug!(queue = %queue, "Queue empty");
                drop(permit);
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
    }

    info!(queue = %queue, "Consumer stopped");
    Ok(())
}

/// Entry point for one worker process: connect, recover stranded
/// deliveries, run the role's consumers until SIGINT/SIGTERM.
pub async fn run_worker(role: WorkerRole, worker_id: usize, settings: Settings) -> Result<()> {
    info!(role = %role, worker_id, "Worker starting");

    let broker: Arc<dyn Broker> = Arc::new(
        RedisBroker::connect(&settings.broker)
            .await
            .context("Failed to connect to the task broker")?,
    );

    let queue = match role {
        WorkerRole::Discovery => settings.broker.discovery_queue.clone(),
        WorkerRole::Extraction => settings.broker.extraction_queue.clone(),
        WorkerRole::Repair => settings.broker.repair_queue.clone(),
    };

    let recovered = broker.recover(&queue).await?;
    if recovered > 0 {
        info!(queue = %queue, recovered, "Restored stranded deliveries");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poll_interval = Duration::from_millis(settings.broker.poll_interval_ms);
    let prefetch = Arc::new(Semaphore::new(settings.broker.prefetch_count.max(1)));

    // One worker per process so the rate limiter, circuit breaker and
    // frontier are shared across all of its consumer slots.
    enum RoleWorker {
        Discovery(Arc<discovery::DiscoveryWorker>),
        Extraction(Arc<extraction::ExtractionWorker>),
        Repair(Arc<repair::RepairWorker>),
    }

    let role_worker = match role {
        WorkerRole::Discovery => RoleWorker::Discovery(Arc::new(discovery::DiscoveryWorker::new(
            &settings,
            Arc::clone(&broker),
        )?)),
        WorkerRole::Extraction => RoleWorker::Extraction(Arc::new(
            extraction::ExtractionWorker::new(&settings, Arc::clone(&broker))?,
        )),
        WorkerRole::Repair => RoleWorker::Repair(Arc::new(repair::RepairWorker::new(
            &settings,
            Arc::clone(&broker),
        )?)),
    };

    let mut consumers = Vec::new();
    for consumer_id in 0..settings.workers.concurrent_consumers.max(1) {
        let broker = Arc::clone(&broker);
        let queue = queue.clone();
        let shutdown_rx = shutdown_rx.clone();
        let prefetch = Arc::clone(&prefetch);

        let handle = match &role_worker {
            RoleWorker::Discovery(worker) => {
                let worker = Arc::clone(worker);
                tokio::spawn(async move {
                    consume(broker, queue, poll_interval, prefetch, shutdown_rx, move |body| {
                        let worker = Arc::clone(&worker);
                        async move { worker.handle(body).await }
                    })
                    .await
                })
            }
            RoleWorker::Extraction(worker) => {
                let worker = Arc::clone(worker);
                tokio::spawn(async move {
                    consume(broker, queue, poll_interval, prefetch, shutdown_rx, move |body| {
                        let worker = Arc::clone(&worker);
                        async move { worker.handle(body).await }
                    })
                    .await
                })
            }
            RoleWorker::Repair(worker) => {
                let worker = Arc::clone(worker);
                tokio::spawn(async move {
                    consume(broker, queue, poll_interval, prefetch, shutdown_rx, move |body| {
                        let worker = Arc::clone(&worker);
                        async move { worker.handle(body).await }
                    })
                    .await
                })
            }
        };
        consumers.push(handle);
        debug!(role = %role, worker_id, consumer_id, "Consumer spawned");
    }

    wait_for_shutdown_signal().await;
    info!(role = %role, worker_id, "Shutdown signal received, draining");
    let _ = shutdown_tx.send(true);

    let grace = Duration::from_secs(settings.workers.shutdown_grace_secs);
    match tokio::time::timeout(grace, futures::future::join_all(consumers)).await {
        Ok(outcomes) => {
            for outcome in outcomes {
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!(role = %role, error = %e, "Consumer exited with error"),
                    Err(e) => error!(role = %role, error = %e, "Consumer task panicked"),
                }
            }
        }
        Err(_) => warn!(role = %role, "Consumers did not drain within grace period"),
    }

    info!(role = %role, worker_id, "Worker stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("SIGTERM handler installation cannot fail");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
