use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::config::Settings;
use crate::crawler::task::RepairTask;
use crate::extract::Registry;
use crate::llm::InferenceClient;
use crate::storage::Broker;

/// Consumes repair tasks: ask the inference backend for replacement
/// selectors, then requeue the original task for another extraction pass.
/// Repair itself is terminal; failures here log and drop.
pub struct RepairWorker {
    client: InferenceClient,
    registry: Registry,
    broker: Arc<dyn Broker>,
    extraction_queue: String,
}

impl RepairWorker {
    pub fn new(settings: &Settings, broker: Arc<dyn Broker>) -> Result<Self> {
        Ok(Self {
            client: InferenceClient::new(&settings.inference)?,
            registry: Registry::with_default_strategies(),
            broker,
            extraction_queue: settings.broker.extraction_queue.clone(),
        })
    }

    pub async fn handle(&self, body: Value) -> Result<()> {
        let repair: RepairTask = match serde_json::from_value(body) {
            Ok(repair) => repair,
            Err(e) => {
                warn!(error = %e, "Dropping malformed repair task");
                return Ok(());
            }
        };

        let Some(strategy) = self.registry.get(repair.page_kind) else {
            warn!(url = %repair.url, kind = %repair.page_kind, "No strategy to repair, dropping");
            return Ok(());
        };

        if repair.html_snippet.is_empty() {
            warn!(url = %repair.url, "Repair task carries no HTML, dropping");
            return Ok(());
        }

        let suggestions = match self
            .client
            .suggest_selectors(
                &repair.html_snippet,
                &repair.failed_selectors,
                strategy.repair_fields(),
            )
            .await
        {
            Ok(suggestions) => suggestions,
            Err(e) => {
                warn!(url = %repair.url, error = %e, "Selector suggestion failed, dropping");
                return Ok(());
            }
        };

        if suggestions.is_empty() {
            warn!(url = %repair.url, "Backend proposed no selectors, dropping");
            return Ok(());
        }

        let retried = repair.original_task.retry_with(Value::Object(suggestions));
        let priority = retried.priority;
        self.broker
            .publish(&self.extraction_queue, serde_json::to_value(&retried)?, priority)
            .await?;

        info!(
            url = %repair.url,
            retry = retried.retry_count,
            "Repaired task requeued for extraction"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::task::{PageKind, Task};
    use crate::storage::MemoryBroker;
    use serde_json::json;

    fn repair_worker() -> (RepairWorker, Arc<dyn Broker>) {
        let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());
        (RepairWorker::new(&Settings::default(), Arc::clone(&broker)).unwrap(), broker)
    }

    #[tokio::test]
    async fn malformed_bodies_are_dropped_not_requeued() {
        let (worker, broker) = repair_worker();
        worker.handle(json!({"not": "a repair task"})).await.unwrap();
        assert_eq!(broker.depth(&worker.extraction_queue).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_snippets_are_dropped() {
        let (worker, broker) = repair_worker();
        let task = Task::new(
            "https://www.transfermarkt.com/x/profil/spieler/1",
            PageKind::PlayerProfile,
            5u8,
        );
        let repair = RepairTask::new(&task, String::new(), "selector miss".to_string());
        worker.handle(serde_json::to_value(&repair).unwrap()).await.unwrap();
        assert_eq!(broker.depth(&worker.extraction_queue).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_kinds_are_dropped() {
        let (worker, broker) = repair_worker();
        let task = Task::new(
            "https://www.transfermarkt.com/wettbewerbe/europa",
            PageKind::LeagueIndex,
            5u8,
        );
        let repair = RepairTask::new(&task, "<html></html>".to_string(), "x".to_string());
        worker.handle(serde_json::to_value(&repair).unwrap()).await.unwrap();
        assert_eq!(broker.depth(&worker.extraction_queue).await.unwrap(), 0);
    }
}
