use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::cli::config::{ExtractionSettings, Settings};
use crate::crawler::task::{ExtractionBackend, ExtractionResult, RepairTask, Task};
use crate::crawler::PageFetcher;
use crate::extract::registry::payload_map;
use crate::extract::{relevant_html, validator, Registry};
use crate::llm::InferenceClient;
use crate::storage::{Broker, ResultLog};

/// Consumes extraction tasks: fetch the page, run the deterministic or
/// generative path (or both), persist the result, and route failures to
/// the repair queue while retries remain.
pub struct ExtractionWorker {
    fetcher: PageFetcher,
    client: InferenceClient,
    registry: Registry,
    broker: Arc<dyn Broker>,
    log: ResultLog,
    extraction: ExtractionSettings,
    repair_queue: String,
}

impl ExtractionWorker {
    pub fn new(settings: &Settings, broker: Arc<dyn Broker>) -> Result<Self> {
        Ok(Self {
            fetcher: PageFetcher::new(&settings.fetch)?,
            client: InferenceClient::new(&settings.inference)?,
            registry: Registry::with_default_strategies(),
            broker,
            log: ResultLog::new(&settings.storage.data_dir)?,
            extraction: settings.extraction.clone(),
            repair_queue: settings.broker.repair_queue.clone(),
        })
    }

    pub async fn handle(&self, body: Value) -> Result<()> {
        let task: Task = match serde_json::from_value(body) {
            Ok(task) => task,
            Err(e) => {
                warn!(error = %e, "Dropping malformed extraction task");
                return Ok(());
            }
        };

        let started = Instant::now();

        let html = match self.fetcher.fetch(&task.url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(url = %task.url, error = %e, "Page fetch failed");
                let result = ExtractionResult::failed(
                    &task.url,
                    task.page_kind,
                    ExtractionBackend::Deterministic,
                    format!("fetch failed: {e}"),
                );
                self.log.append(&result).await?;
                self.route_to_repair(&task, String::new(), &format!("fetch failed: {e}"))
                    .await?;
                return Ok(());
            }
        };

        let mut result = self.extract_page(&html, &task).await;
        result.extraction_time_ms = Some(started.elapsed().as_secs_f64() * 1_000.0);

        info!(
            url = %task.url,
            kind = %task.page_kind,
            success = result.success,
            backend = ?result.backend,
            elapsed_ms = result.extraction_time_ms,
            "Extraction finished"
        );

        self.log.append(&result).await?;

        if !result.success {
            let snippet = relevant_html(
                &html,
                task.page_kind,
                self.extraction.repair_snippet_chars,
            );
            let error = result.error.clone().unwrap_or_else(|| "unknown error".to_string());
            self.route_to_repair(&task, snippet, &error).await?;
        }

        Ok(())
    }

    /// Two-tier extraction. Deterministic first on allow-listed kinds, then
    /// the generative path as fallback or as the only path for everything
    /// else. A backend of `DeterministicThenGenerative` records that the
    /// deterministic parser was tried and missed.
    async fn extract_page(&self, html: &str, task: &Task) -> ExtractionResult {
        let Some(strategy) = self.registry.get(task.page_kind) else {
            return ExtractionResult::failed(
                &task.url,
                task.page_kind,
                ExtractionBackend::Deterministic,
                format!("no extraction strategy for {}", task.page_kind),
            );
        };

        let deterministic_allowed = self.extraction.use_deterministic
            && self.extraction.deterministic_kinds.contains(&task.page_kind);

        if deterministic_allowed {
            match strategy.parse(html, &task.url) {
                Ok(payload) => {
                    let validation = self
                        .extraction
                        .validate_deterministic
                        .then(|| validator::validate(&payload, task.page_kind));

                    let mut result = ExtractionResult::succeeded(
                        &task.url,
                        task.page_kind,
                        ExtractionBackend::Deterministic,
                        payload_map(&payload),
                    );
                    strategy.populate(&task.url, &payload, &mut result);
                    result.validation = validation;
                    return result;
                }
                Err(e) if self.extraction.fallback_to_generative => {
                    debug!(url = %task.url, error = %e, "Deterministic parse missed, going generative");
                    return self
                        .generative(html, task, ExtractionBackend::DeterministicThenGenerative)
                        .await;
                }
                Err(e) => {
                    return ExtractionResult::failed(
                        &task.url,
                        task.page_kind,
                        ExtractionBackend::Deterministic,
                        e.to_string(),
                    );
                }
            }
        }

        self.generative(html, task, ExtractionBackend::Generative).await
    }

    async fn generative(
        &self,
        html: &str,
        task: &Task,
        backend: ExtractionBackend,
    ) -> ExtractionResult {
        // Strategy lookup already succeeded in extract_page.
        let Some(strategy) = self.registry.get(task.page_kind) else {
            return ExtractionResult::failed(
                &task.url,
                task.page_kind,
                backend,
                format!("no extraction strategy for {}", task.page_kind),
            );
        };

        let excerpt = relevant_html(html, task.page_kind, usize::MAX);
        match self
            .client
            .extract_structured(&excerpt, task.page_kind.as_str(), strategy.schema())
            .await
        {
            Ok(payload) => {
                let mut result = ExtractionResult::succeeded(
                    &task.url,
                    task.page_kind,
                    backend,
                    payload_map(&payload),
                );
                strategy.populate(&task.url, &payload, &mut result);
                result
            }
            Err(e) => ExtractionResult::failed(&task.url, task.page_kind, backend, e.to_string()),
        }
    }

    async fn route_to_repair(&self, task: &Task, snippet: String, error: &str) -> Result<()> {
        if task.retry_count >= self.extraction.max_task_retries {
            warn!(
                url = %task.url,
                retries = task.retry_count,
                "Retry budget exhausted, not routing to repair"
            );
            return Ok(());
        }

        let repair = RepairTask::new(task, snippet, error.to_string());
        self.broker
            .publish(&self.repair_queue, serde_json::to_value(&repair)?, task.priority)
            .await?;
        info!(url = %task.url, "Routed failed extraction to repair");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBroker;
    use tempfile::TempDir;

    fn worker_with(settings: &Settings) -> (ExtractionWorker, Arc<dyn Broker>, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut settings = settings.clone();
        settings.storage.data_dir = dir.path().to_path_buf();
        let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());
        let worker = ExtractionWorker::new(&settings, Arc::clone(&broker)).unwrap();
        (worker, broker, dir)
    }

    const PLAYER_HTML: &str = r#"
        <html><body>
        <h1 class="data-header__headline-wrapper">Erling Haaland</h1>
        <div class="info-table">
            <span class="info-table__content info-table__content--label">Height:</span>
            <span class="info-table__content info-table__content--regular">1,94 m</span>
        </div>
        </body></html>
    "#;

    #[tokio::test]
    async fn deterministic_path_marks_backend_and_validates() {
        let (worker, _broker, _dir) = worker_with(&Settings::default());
        let task = Task::new(
            "https://www.transfermarkt.com/x/profil/spieler/418560",
            crate::crawler::task::PageKind::PlayerProfile,
            5u8,
        );

        let result = worker.extract_page(PLAYER_HTML, &task).await;

        assert!(result.success);
        assert_eq!(result.backend, ExtractionBackend::Deterministic);
        assert_eq!(result.players.len(), 1);
        assert_eq!(result.players[0].height_cm, Some(194));
        assert!(result.validation.is_some());
    }

    #[tokio::test]
    async fn unknown_kind_fails_without_strategy() {
        let (worker, _broker, _dir) = worker_with(&Settings::default());
        let task = Task::new(
            "https://www.transfermarkt.com/wettbewerbe/europa",
            crate::crawler::task::PageKind::LeagueIndex,
            5u8,
        );

        let result = worker.extract_page("<html></html>", &task).await;

        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("no extraction strategy"));
    }

    #[tokio::test]
    async fn deterministic_miss_without_fallback_is_a_failure() {
        let mut settings = Settings::default();
        settings.extraction.fallback_to_generative = false;
        let (worker, _broker, _dir) = worker_with(&settings);

        let task = Task::new(
            "https://www.transfermarkt.com/x/profil/spieler/1",
            crate::crawler::task::PageKind::PlayerProfile,
            5u8,
        );

        let result = worker.extract_page("<html><body></body></html>", &task).await;

        assert!(!result.success);
        assert_eq!(result.backend, ExtractionBackend::Deterministic);
    }

    #[tokio::test]
    async fn repair_routing_respects_the_retry_budget() {
        let (worker, broker, _dir) = worker_with(&Settings::default());

        let fresh = Task::new(
            "https://www.transfermarkt.com/x/profil/spieler/1",
            crate::crawler::task::PageKind::PlayerProfile,
            5u8,
        );
        worker.route_to_repair(&fresh, String::new(), "boom").await.unwrap();
        assert_eq!(broker.depth(&worker.repair_queue).await.unwrap(), 1);

        let mut exhausted = fresh.clone();
        exhausted.retry_count = worker.extraction.max_task_retries;
        worker.route_to_repair(&exhausted, String::new(), "boom").await.unwrap();
        assert_eq!(broker.depth(&worker.repair_queue).await.unwrap(), 1);
    }
}
