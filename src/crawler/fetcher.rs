use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::cli::config::FetchSettings;

/// How a page fetch failed. Carries the last failure seen once retries
/// are exhausted, so callers can log something better than "gave up".
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("connection error: {0}")]
    Connect(String),
    #[error("http status {0}")]
    Status(u16),
    #[error("rate limited by origin")]
    RateLimited,
    #[error("fetch failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

/// Plain HTTP page fetcher with a politeness delay, bounded retries,
/// and escalating sleeps on 429 responses.
pub struct PageFetcher {
    client: reqwest::Client,
    settings: FetchSettings,
}

impl PageFetcher {
    pub fn new(settings: &FetchSettings) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert("DNT", HeaderValue::from_static("1"));
        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));

        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .cookie_store(true)
            .build()?;

        Ok(Self { client, settings: settings.clone() })
    }

    /// Fetch a page body. Sleeps a uniform politeness delay before the first
    /// attempt; 429 responses trigger an escalating wait instead of a
    /// straight retry.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let delay = {
            let mut rng = rand::thread_rng();
            rng.gen_range(self.settings.delay_min_secs..=self.settings.delay_max_secs)
        };
        tokio::time::sleep(Duration::from_secs_f64(delay)).await;

        let mut last = FetchError::Connect("no attempt made".to_string());

        for attempt in 0..self.settings.max_retries {
            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let body = response
                            .text()
                            .await
                            .map_err(|e| FetchError::Connect(e.to_string()))?;
                        info!(url, status = status.as_u16(), size = body.len(), "page fetched");
                        return Ok(body);
                    } else if status.as_u16() == 429 {
                        let wait = self.settings.rate_limit_backoff_secs * (attempt as u64 + 1);
                        warn!(url, wait_secs = wait, "origin rate limited, backing off");
                        last = FetchError::RateLimited;
                        tokio::time::sleep(Duration::from_secs(wait)).await;
                    } else {
                        warn!(url, status = status.as_u16(), attempt = attempt + 1, "http error");
                        last = FetchError::Status(status.as_u16());
                    }
                }
                Err(e) if e.is_timeout() => {
                    warn!(url, attempt = attempt + 1, "request timeout");
                    last = FetchError::Timeout;
                }
                Err(e) => {
                    warn!(url, error = %e, attempt = attempt + 1, "request error");
                    last = FetchError::Connect(e.to_string());
                }
            }
        }

        Err(FetchError::RetriesExhausted {
            attempts: self.settings.max_retries,
            last: Box::new(last),
        })
    }
}
