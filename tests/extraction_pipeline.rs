use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use transfer_crawler::cli::config::Settings;
use transfer_crawler::crawler::task::{ExtractionBackend, ExtractionResult, PageKind, Task};
use transfer_crawler::storage::{Broker, MemoryBroker};
use transfer_crawler::workers::extraction::ExtractionWorker;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn completion_with(content: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"message": {"role": "assistant", "content": content.to_string()}}]
    }))
}

fn pipeline_settings(inference_uri: &str, data_dir: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.inference.base_url = inference_uri.to_string();
    settings.inference.max_retries = 1;
    settings.fetch.delay_min_secs = 0.0;
    settings.fetch.delay_max_secs = 0.0;
    settings.fetch.max_retries = 1;
    settings.storage.data_dir = data_dir.path().to_path_buf();
    settings
}

fn results_for(dir: &TempDir, kind: &str) -> Vec<ExtractionResult> {
    let date = chrono::Utc::now().format("%Y-%m-%d");
    let contents =
        std::fs::read_to_string(dir.path().join(format!("{kind}_{date}.jsonl"))).unwrap();
    contents.lines().map(|line| serde_json::from_str(line).unwrap()).collect()
}

const BARE_PLAYER_PAGE: &str =
    "<html><body><h1>Erling Haaland</h1><p>layout changed, no info table</p></body></html>";

const FULL_PLAYER_PAGE: &str = r#"<html><body>
    <h1 class="data-header__headline-wrapper">Erling Haaland</h1>
    <div class="info-table">
        <span class="info-table__content info-table__content--label">Height:</span>
        <span class="info-table__content info-table__content--regular">1,94 m</span>
        <span class="info-table__content info-table__content--label">Citizenship:</span>
        <span class="info-table__content info-table__content--regular">Norway</span>
    </div>
</body></html>"#;

#[tokio::test]
async fn deterministic_miss_falls_back_to_the_generative_path() {
    let pages = MockServer::start().await;
    let inference = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/erling-haaland/profil/spieler/418560"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BARE_PLAYER_PAGE))
        .mount(&pages)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion_with(json!({
            "player": {
                "site_id": "418560",
                "name": "Erling Haaland",
                "height_cm": 194,
                "nationality": "Norway"
            }
        })))
        .expect(1)
        .mount(&inference)
        .await;

    let dir = TempDir::new().unwrap();
    let settings = pipeline_settings(&inference.uri(), &dir);
    let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());
    let worker = ExtractionWorker::new(&settings, Arc::clone(&broker)).unwrap();

    let task = Task::new(
        format!("{}/erling-haaland/profil/spieler/418560", pages.uri()),
        PageKind::PlayerProfile,
        5u8,
    );
    worker.handle(serde_json::to_value(&task).unwrap()).await.unwrap();

    let results = results_for(&dir, "player_profile");
    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert!(result.success);
    assert_eq!(result.backend, ExtractionBackend::DeterministicThenGenerative);
    assert_eq!(result.players.len(), 1);
    assert_eq!(result.players[0].name.as_deref(), Some("Erling Haaland"));
    assert_eq!(result.players[0].height_cm, Some(194));

    // Nothing was routed to repair.
    assert_eq!(broker.depth(&settings.broker.repair_queue).await.unwrap(), 0);
}

#[tokio::test]
async fn deterministic_success_never_calls_the_inference_backend() {
    let pages = MockServer::start().await;
    let inference = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/erling-haaland/profil/spieler/418560"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FULL_PLAYER_PAGE))
        .mount(&pages)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion_with(json!({})))
        .expect(0)
        .mount(&inference)
        .await;

    let dir = TempDir::new().unwrap();
    let settings = pipeline_settings(&inference.uri(), &dir);
    let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());
    let worker = ExtractionWorker::new(&settings, Arc::clone(&broker)).unwrap();

    let task = Task::new(
        format!("{}/erling-haaland/profil/spieler/418560", pages.uri()),
        PageKind::PlayerProfile,
        5u8,
    );
    worker.handle(serde_json::to_value(&task).unwrap()).await.unwrap();

    let results = results_for(&dir, "player_profile");
    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert_eq!(results[0].backend, ExtractionBackend::Deterministic);
    assert!(results[0].validation.is_some());
}

#[tokio::test]
async fn backend_failure_persists_the_result_and_routes_to_repair() {
    let pages = MockServer::start().await;
    let inference = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/erling-haaland/profil/spieler/418560"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BARE_PLAYER_PAGE))
        .mount(&pages)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&inference)
        .await;

    let dir = TempDir::new().unwrap();
    let settings = pipeline_settings(&inference.uri(), &dir);
    let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());
    let worker = ExtractionWorker::new(&settings, Arc::clone(&broker)).unwrap();

    let task = Task::new(
        format!("{}/erling-haaland/profil/spieler/418560", pages.uri()),
        PageKind::PlayerProfile,
        5u8,
    );
    worker.handle(serde_json::to_value(&task).unwrap()).await.unwrap();

    let results = results_for(&dir, "player_profile");
    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
    assert!(results[0].error.is_some());

    assert_eq!(broker.depth(&settings.broker.repair_queue).await.unwrap(), 1);
}

#[tokio::test]
async fn fetch_failure_persists_a_failed_result() {
    let pages = MockServer::start().await;
    let inference = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/gone/profil/spieler/7"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&pages)
        .await;

    let dir = TempDir::new().unwrap();
    let settings = pipeline_settings(&inference.uri(), &dir);
    let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());
    let worker = ExtractionWorker::new(&settings, Arc::clone(&broker)).unwrap();

    let task = Task::new(
        format!("{}/gone/profil/spieler/7", pages.uri()),
        PageKind::PlayerProfile,
        5u8,
    );
    worker.handle(serde_json::to_value(&task).unwrap()).await.unwrap();

    let results = results_for(&dir, "player_profile");
    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
    assert!(results[0].error.as_deref().unwrap().contains("fetch failed"));
}
