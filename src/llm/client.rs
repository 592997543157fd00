use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::cli::config::InferenceSettings;
use crate::llm::backoff::RetryPolicy;
use crate::llm::breaker::CircuitBreaker;
use crate::llm::error::InferenceError;
use crate::llm::limiter::RateLimiter;

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Client for a chat-completion inference backend, with every call gated by
/// the circuit breaker, the rate limiter, and the retry executor. The
/// breaker and limiter live here, so their scope is exactly one client in
/// one process.
pub struct InferenceClient {
    http: reqwest::Client,
    settings: InferenceSettings,
    limiter: RateLimiter,
    breaker: Mutex<CircuitBreaker>,
    policy: RetryPolicy,
}

impl InferenceClient {
    pub fn new(settings: &InferenceSettings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            http,
            settings: settings.clone(),
            limiter: RateLimiter::new(
                settings.requests_per_minute,
                settings.max_concurrent_requests,
            ),
            breaker: Mutex::new(CircuitBreaker::new(
                settings.breaker_threshold,
                Duration::from_secs(settings.breaker_timeout_secs),
            )),
            policy: RetryPolicy::new(
                settings.max_retries,
                settings.base_backoff_secs,
                settings.max_backoff_secs,
            ),
        })
    }

    /// Run one unit of backend work under full protection: breaker admission,
    /// then a concurrency slot and a rate token, then bounded retries with
    /// jittered exponential backoff. Success and terminal failure both report
    /// to the breaker; a breaker rejection reports nothing and costs nothing.
    async fn call<T, F, Fut>(&self, operation: &str, work: F) -> Result<T, InferenceError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, InferenceError>>,
    {
        if !self.breaker.lock().await.try_acquire() {
            warn!(operation, "circuit breaker open, deferring call");
            return Err(InferenceError::BreakerOpen);
        }

        // Slot releases on every exit path, including cancellation.
        let _permit = self.limiter.acquire().await;

        let mut attempt = 0;
        loop {
            match work().await {
                Ok(value) => {
                    self.breaker.lock().await.record_success();
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt + 1 < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        max_retries = self.policy.max_retries,
                        error = %e,
                        backoff_secs = delay.as_secs_f64(),
                        "inference call retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    self.breaker.lock().await.record_failure();
                    return Err(e);
                }
            }
        }
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String, InferenceError> {
        let request = ChatRequest {
            model: &self.settings.model_name,
            messages,
            temperature,
            max_tokens,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.settings.base_url))
            .bearer_auth(&self.settings.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(InferenceError::RateLimited);
        }
        if !status.is_success() {
            return Err(InferenceError::Status(status.as_u16()));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::MalformedCompletion(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| InferenceError::MalformedCompletion("empty choices".to_string()))
    }

    /// Extract structured data from HTML via the generative backend. The
    /// completion is parsed as JSON, tolerating markdown code fences.
    pub async fn extract_structured(
        &self,
        html: &str,
        page_kind: &str,
        schema: &str,
    ) -> Result<Value, InferenceError> {
        let system = format!(
            "You are a specialized web scraping assistant that extracts structured data \
             from football transfer-market HTML pages.\n\n\
             Page Type: {page_kind}\n\n\
             Your task is to extract the following information and return it as valid JSON:\n\
             {schema}\n\n\
             Rules:\n\
             1. Return ONLY valid JSON, no markdown or explanation\n\
             2. Use null for missing values\n\
             3. Extract site IDs from URLs (e.g., \"/player/123\" -> \"123\")\n\
             4. Normalize dates to ISO format (YYYY-MM-DD)\n\
             5. For fees, extract numeric amount and currency separately\n\
             6. If information is not found, return empty structures rather than failing"
        );

        let excerpt = truncate_chars(html, self.settings.max_input_chars);
        let messages = vec![
            ChatMessage { role: "system", content: system },
            ChatMessage { role: "user", content: format!("HTML:\n{}", excerpt) },
        ];

        let content = self
            .call(&format!("extract_{}", page_kind), || {
                self.chat(&messages, self.settings.temperature, self.settings.max_tokens)
            })
            .await?;

        let value: Value = serde_json::from_str(strip_code_fences(&content))?;
        info!(page_kind, "generative extraction completed");

        Ok(value)
    }

    /// Ask the backend to propose replacement CSS selectors for fields a
    /// deterministic parser failed on. Low temperature, small completion.
    pub async fn suggest_selectors(
        &self,
        html_snippet: &str,
        failed_selectors: &Map<String, Value>,
        fields: &[&str],
    ) -> Result<Map<String, Value>, InferenceError> {
        let system = "You are a CSS selector expert. Given HTML and failed selectors, suggest new ones.\n\n\
                      Return ONLY valid JSON in this format:\n\
                      {\n  \"field_name\": \"css_selector\",\n  ...\n}\n\n\
                      Rules:\n\
                      1. Return ONLY the JSON object, no explanation\n\
                      2. Suggest specific, robust selectors\n\
                      3. Prefer class and data attributes over complex nesting\n\
                      4. Test mentally that the selector would work on the HTML"
            .to_string();

        let failed_info = failed_selectors
            .iter()
            .map(|(field, selector)| format!("- {}: '{}' (FAILED)", field, selector))
            .collect::<Vec<_>>()
            .join("\n");
        let field_list = fields.join(", ");

        let user = format!(
            "Previously failed selectors:\n{failed_info}\n\n\
             Fields to extract: {field_list}\n\n\
             HTML:\n{}\n\n\
             Suggest new CSS selectors for: {field_list}",
            truncate_chars(html_snippet, 4_000)
        );

        let messages = vec![
            ChatMessage { role: "system", content: system },
            ChatMessage { role: "user", content: user },
        ];

        let content = self
            .call("suggest_selectors", || self.chat(&messages, 0.2, 256))
            .await?;

        let value: Value = serde_json::from_str(strip_code_fences(&content))?;
        match value {
            Value::Object(map) => {
                info!(fields = map.len(), "selector suggestions received");
                Ok(map)
            }
            other => Err(InferenceError::MalformedCompletion(format!(
                "expected a JSON object of selectors, got {}",
                other
            ))),
        }
    }
}

/// Unwrap a completion from ```json fences (or bare ``` fences) if present.
pub fn strip_code_fences(content: &str) -> &str {
    if let Some(after) = content.split_once("```json").map(|(_, rest)| rest) {
        if let Some((inner, _)) = after.split_once("```") {
            return inner.trim();
        }
        return after.trim();
    }
    if let Some(after) = content.split_once("```").map(|(_, rest)| rest) {
        if let Some((inner, _)) = after.split_once("```") {
            return inner.trim();
        }
    }
    content.trim()
}

/// Cap a string at a char boundary without panicking on multibyte input.
fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
