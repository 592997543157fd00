use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::crawler::records::{Club, Player, Transfer};

/// Classification of a crawled page, driving routing and extraction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    LeagueIndex,
    LeagueClubs,
    ClubProfile,
    ClubTransfers,
    PlayerProfile,
    PlayerTransfers,
    CompetitionPage,
    Unknown,
}

impl PageKind {
    /// Wire/file name for this kind (matches the serde form).
    pub fn as_str(&self) -> &'static str {
        match self {
            PageKind::LeagueIndex => "league_index",
            PageKind::LeagueClubs => "league_clubs",
            PageKind::ClubProfile => "club_profile",
            PageKind::ClubTransfers => "club_transfers",
            PageKind::PlayerProfile => "player_profile",
            PageKind::PlayerTransfers => "player_transfers",
            PageKind::CompetitionPage => "competition_page",
            PageKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named priority levels. The broker accepts the full 0..=10 range;
/// these are the values the classifier hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl From<TaskPriority> for u8 {
    fn from(p: TaskPriority) -> u8 {
        match p {
            TaskPriority::Low => 2,
            TaskPriority::Medium => 5,
            TaskPriority::High => 8,
            TaskPriority::Critical => 10,
        }
    }
}

/// A unit of crawl or extraction work. Identity is the URL; a task is never
/// mutated once published - retries construct a new value via [`Task::retry_with`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub url: String,
    pub page_kind: PageKind,
    pub priority: u8,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(url: impl Into<String>, page_kind: PageKind, priority: impl Into<u8>) -> Self {
        Self {
            url: url.into(),
            page_kind,
            priority: priority.into().min(10),
            metadata: Map::new(),
            retry_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Build the follow-up task for a repaired extraction: same locator and
    /// kind, retry count incremented, suggested selectors carried in metadata.
    pub fn retry_with(&self, suggested_selectors: Value) -> Self {
        let mut metadata = self.metadata.clone();
        metadata.insert("repaired".to_string(), Value::Bool(true));
        metadata.insert("suggested_selectors".to_string(), suggested_selectors);

        Self {
            url: self.url.clone(),
            page_kind: self.page_kind,
            priority: self.priority,
            metadata,
            retry_count: self.retry_count + 1,
            created_at: Utc::now(),
        }
    }
}

/// Request for the repair worker: everything the inference backend needs to
/// propose new selectors for a failed extraction. Terminal - it either yields
/// a new [`Task`] or is dropped after logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairTask {
    pub url: String,
    pub page_kind: PageKind,
    pub html_snippet: String,
    #[serde(default)]
    pub failed_selectors: Map<String, Value>,
    pub error_message: String,
    pub original_task: Task,
    pub created_at: DateTime<Utc>,
}

impl RepairTask {
    pub fn new(task: &Task, html_snippet: String, error_message: String) -> Self {
        Self {
            url: task.url.clone(),
            page_kind: task.page_kind,
            html_snippet,
            failed_selectors: Map::new(),
            error_message,
            original_task: task.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Which extraction path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionBackend {
    #[serde(rename = "deterministic")]
    Deterministic,
    #[serde(rename = "generative")]
    Generative,
    #[serde(rename = "deterministic-then-generative")]
    DeterministicThenGenerative,
}

/// Advisory report from validating a deterministic extraction payload.
/// Attached to the result, never a persistence gate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub suggested_fixes: Vec<Value>,
    pub confidence: f64,
    #[serde(default)]
    pub needs_review: bool,
}

impl ValidationReport {
    pub fn clean() -> Self {
        Self {
            warnings: Vec::new(),
            suggested_fixes: Vec::new(),
            confidence: 1.0,
            needs_review: false,
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Outcome of one extraction attempt. Immutable once built; appended to the
/// result log whether or not it succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub success: bool,
    pub page_kind: PageKind,
    pub url: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default)]
    pub clubs: Vec<Club>,
    #[serde(default)]
    pub transfers: Vec<Transfer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_time_ms: Option<f64>,
    pub backend: ExtractionBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    pub extracted_at: DateTime<Utc>,
}

impl ExtractionResult {
    pub fn succeeded(
        url: &str,
        page_kind: PageKind,
        backend: ExtractionBackend,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            success: true,
            page_kind,
            url: url.to_string(),
            data,
            players: Vec::new(),
            clubs: Vec::new(),
            transfers: Vec::new(),
            error: None,
            extraction_time_ms: None,
            backend,
            validation: None,
            extracted_at: Utc::now(),
        }
    }

    /// Failed results always carry a non-empty error message.
    pub fn failed(
        url: &str,
        page_kind: PageKind,
        backend: ExtractionBackend,
        error: impl Into<String>,
    ) -> Self {
        let error = error.into();
        let error = if error.is_empty() { "unknown error".to_string() } else { error };

        Self {
            success: false,
            page_kind,
            url: url.to_string(),
            data: Map::new(),
            players: Vec::new(),
            clubs: Vec::new(),
            transfers: Vec::new(),
            error: Some(error),
            extraction_time_ms: None,
            backend,
            validation: None,
            extracted_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn retry_increments_count_and_keeps_identity() {
        let task = Task::new(
            "https://example.com/x/profil/spieler/1",
            PageKind::PlayerProfile,
            TaskPriority::Medium,
        )
        .with_metadata("discovered_from", json!("https://example.com"));

        let retried = task.retry_with(json!({"name": "h1.headline"}));

        assert_eq!(retried.url, task.url);
        assert_eq!(retried.page_kind, task.page_kind);
        assert_eq!(retried.retry_count, 1);
        assert_eq!(retried.metadata["repaired"], json!(true));
        assert_eq!(retried.metadata["discovered_from"], json!("https://example.com"));
        assert_eq!(retried.metadata["suggested_selectors"]["name"], json!("h1.headline"));
        // Original is untouched.
        assert_eq!(task.retry_count, 0);
    }

    #[test]
    fn failed_result_always_has_error() {
        let result = ExtractionResult::failed(
            "https://example.com",
            PageKind::ClubTransfers,
            ExtractionBackend::Generative,
            "",
        );
        assert!(!result.success);
        assert!(result.error.as_deref().map_or(false, |e| !e.is_empty()));
    }

    #[test]
    fn page_kind_round_trips_through_wire_form() {
        let kind: PageKind = serde_json::from_str("\"club_transfers\"").unwrap();
        assert_eq!(kind, PageKind::ClubTransfers);
        assert_eq!(
            serde_json::to_string(&PageKind::PlayerProfile).unwrap(),
            "\"player_profile\""
        );
    }

    #[test]
    fn backend_wire_names() {
        assert_eq!(
            serde_json::to_string(&ExtractionBackend::DeterministicThenGenerative).unwrap(),
            "\"deterministic-then-generative\""
        );
    }
}
