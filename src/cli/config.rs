use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::crawler::task::PageKind;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub inference: InferenceSettings,
    pub fetch: FetchSettings,
    pub extraction: ExtractionSettings,
    pub workers: WorkerSettings,
    pub storage: StorageSettings,
    pub seeds: Vec<String>,
}

/// Task broker (Redis) connection and queue naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub redis_url: String,
    pub discovery_queue: String,
    pub extraction_queue: String,
    pub repair_queue: String,
    /// Highest accepted task priority.
    pub max_priority: u8,
    /// In-flight deliveries held at once per process.
    pub prefetch_count: usize,
    /// Idle poll interval when a queue is empty, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            discovery_queue: "discovery_queue".to_string(),
            extraction_queue: "extraction_queue".to_string(),
            repair_queue: "repair_queue".to_string(),
            max_priority: 10,
            prefetch_count: 1,
            poll_interval_ms: 500,
        }
    }
}

/// Chat-completion inference backend plus the resilience knobs that
/// guard calls to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    pub base_url: String,
    pub api_key: String,
    pub model_name: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// HTML characters handed to the model per request.
    pub max_input_chars: usize,

    // Rate limiting
    pub requests_per_minute: u32,
    pub max_concurrent_requests: usize,

    // Retry / backoff
    pub max_retries: u32,
    pub base_backoff_secs: f64,
    pub max_backoff_secs: f64,

    // Circuit breaker
    pub breaker_threshold: u32,
    pub breaker_timeout_secs: u64,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            api_key: "token".to_string(),
            model_name: "meta-llama/Meta-Llama-3.1-8B-Instruct".to_string(),
            temperature: 0.1,
            max_tokens: 512,
            max_input_chars: 20_000,
            requests_per_minute: 20,
            max_concurrent_requests: 2,
            max_retries: 5,
            base_backoff_secs: 1.0,
            max_backoff_secs: 60.0,
            breaker_threshold: 5,
            breaker_timeout_secs: 60,
        }
    }
}

/// Page fetching behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub user_agent: String,
    pub request_timeout_secs: u64,
    /// Politeness delay bounds before each fetch, in seconds.
    pub delay_min_secs: f64,
    pub delay_max_secs: f64,
    pub max_retries: u32,
    /// Base escalating wait after a 429 response, in seconds.
    pub rate_limit_backoff_secs: u64,
    /// Links outside this domain are dropped during discovery.
    pub allowed_domain: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36".to_string(),
            request_timeout_secs: 30,
            delay_min_secs: 2.0,
            delay_max_secs: 5.0,
            max_retries: 3,
            rate_limit_backoff_secs: 30,
            allowed_domain: "transfermarkt.com".to_string(),
        }
    }
}

/// Extraction backend selection and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    /// Master switch for the deterministic parser path.
    pub use_deterministic: bool,
    /// Page kinds allowed to use the deterministic parser.
    pub deterministic_kinds: Vec<PageKind>,
    /// Fall back to the generative backend when the deterministic parser fails.
    pub fallback_to_generative: bool,
    /// Run the advisory validator over deterministic output.
    pub validate_deterministic: bool,
    /// Times a failed locator cycles through the repair queue before giving up.
    pub max_task_retries: u32,
    /// HTML excerpt size carried on repair tasks, in characters.
    pub repair_snippet_chars: usize,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            use_deterministic: true,
            deterministic_kinds: vec![PageKind::PlayerProfile, PageKind::ClubTransfers],
            fallback_to_generative: true,
            validate_deterministic: true,
            max_task_retries: 3,
            repair_snippet_chars: 5_000,
        }
    }
}

/// Worker pool sizing and shutdown behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub discovery_workers: usize,
    pub extraction_workers: usize,
    pub repair_workers: usize,
    /// Concurrent queue consumers per worker process.
    pub concurrent_consumers: usize,
    /// Seconds to wait for in-flight handlers before force-killing a worker.
    pub shutdown_grace_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            discovery_workers: 2,
            extraction_workers: 4,
            repair_workers: 1,
            concurrent_consumers: 3,
            shutdown_grace_secs: 10,
        }
    }
}

/// On-disk output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub data_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/extracted"),
            logs_dir: PathBuf::from("logs"),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings::default(),
            inference: InferenceSettings::default(),
            fetch: FetchSettings::default(),
            extraction: ExtractionSettings::default(),
            workers: WorkerSettings::default(),
            storage: StorageSettings::default(),
            seeds: vec![
                "https://www.transfermarkt.com/premier-league/startseite/wettbewerb/GB1".to_string(),
                "https://www.transfermarkt.com/laliga/startseite/wettbewerb/ES1".to_string(),
                "https://www.transfermarkt.com/bundesliga/startseite/wettbewerb/L1".to_string(),
                "https://www.transfermarkt.com/serie-a/startseite/wettbewerb/IT1".to_string(),
                "https://www.transfermarkt.com/ligue-1/startseite/wettbewerb/FR1".to_string(),
            ],
        }
    }
}

impl Settings {
    /// Path to the config directory.
    fn config_dir() -> PathBuf {
        if let Some(proj_dirs) =
            directories::ProjectDirs::from("com", "transfer-crawler", "transfer-crawler")
        {
            proj_dirs.config_dir().to_path_buf()
        } else {
            PathBuf::from("./config")
        }
    }

    /// Load configuration: an explicit path wins, otherwise the default
    /// config file (created on first run).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from_file(p),
            None => Self::load_default(),
        }
    }

    /// Load the default configuration, writing one out if none exists yet.
    pub fn load_default() -> Result<Self> {
        let config_path = Self::config_dir().join("default.yaml");

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            info!("default configuration not found, creating one");
            let settings = Self::default();
            settings.save_to_file(&config_path)?;
            Ok(settings)
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        debug!("loading configuration from: {}", path.display());
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read configuration file: {}", path.display()))?;

        let settings: Self = serde_yaml::from_str(&contents)
            .context(format!("Failed to parse configuration file: {}", path.display()))?;

        Ok(settings)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        debug!("saving configuration to: {}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let contents = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        fs::write(path, contents)
            .context(format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_yaml() {
        let settings = Settings::default();
        let yaml = serde_yaml::to_string(&settings).unwrap();
        let parsed: Settings = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.broker.max_priority, 10);
        assert_eq!(parsed.inference.requests_per_minute, 20);
        assert_eq!(parsed.workers.extraction_workers, 4);
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let yaml = "inference:\n  requests_per_minute: 5\n";
        let parsed: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed.inference.requests_per_minute, 5);
        // Untouched sections keep their defaults.
        assert_eq!(parsed.inference.max_concurrent_requests, 2);
        assert_eq!(parsed.broker.discovery_queue, "discovery_queue");
        assert!(parsed
            .extraction
            .deterministic_kinds
            .contains(&PageKind::ClubTransfers));
    }
}
