use anyhow::Result;
use scraper::{Html, Selector};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use url::Url;

use crate::cli::config::Settings;
use crate::crawler::classify::{is_high_value, priority_for, LinkClassifier};
use crate::crawler::frontier::{normalize_url, Frontier};
use crate::crawler::task::{PageKind, Task};
use crate::crawler::PageFetcher;
use crate::storage::Broker;

/// Crawls navigation pages, classifies outbound links, and feeds new tasks
/// into the discovery and extraction queues.
pub struct DiscoveryWorker {
    fetcher: PageFetcher,
    classifier: LinkClassifier,
    frontier: Mutex<Frontier>,
    broker: Arc<dyn Broker>,
    discovery_queue: String,
    extraction_queue: String,
    allowed_domain: String,
}

impl DiscoveryWorker {
    pub fn new(settings: &Settings, broker: Arc<dyn Broker>) -> Result<Self> {
        Ok(Self {
            fetcher: PageFetcher::new(&settings.fetch)?,
            classifier: LinkClassifier::new(),
            frontier: Mutex::new(Frontier::new()),
            broker,
            discovery_queue: settings.broker.discovery_queue.clone(),
            extraction_queue: settings.broker.extraction_queue.clone(),
            allowed_domain: settings.fetch.allowed_domain.clone(),
        })
    }

    pub async fn handle(&self, body: Value) -> Result<()> {
        let task: Task = match serde_json::from_value(body) {
            Ok(task) => task,
            Err(e) => {
                warn!(error = %e, "Dropping malformed discovery task");
                return Ok(());
            }
        };

        debug!(url = %task.url, kind = %task.page_kind, "Discovering");

        let html = match self.fetcher.fetch(&task.url).await {
            Ok(html) => html,
            Err(e) => {
                // The fetcher already retried; a page we cannot reach now
                // will come back through a later navigation pass.
                warn!(url = %task.url, error = %e, "Discovery fetch failed, dropping task");
                return Ok(());
            }
        };

        let links = extract_links(&html, &task.url);
        let mut published = 0usize;

        for link in links {
            if !self.in_allowed_domain(&link) {
                continue;
            }
            let normalized = normalize_url(&link);

            let kind = self.classifier.classify(&normalized);
            if kind == PageKind::Unknown {
                continue;
            }

            {
                let mut frontier = self.frontier.lock().expect("frontier lock poisoned");
                if frontier.already_seen(&normalized) {
                    continue;
                }
                frontier.mark_seen(&normalized);
            }

            let queue = if is_high_value(kind) {
                &self.extraction_queue
            } else {
                &self.discovery_queue
            };

            let mut next = Task::new(&normalized, kind, priority_for(kind))
                .with_metadata("discovered_from", json!(task.url));
            if let Some(site_id) = self.classifier.extract_site_id(&normalized) {
                next = next.with_metadata("site_id", json!(site_id));
            }
            let priority = next.priority;
            self.broker.publish(queue, serde_json::to_value(&next)?, priority).await?;
            published += 1;
            debug!(url = %normalized, kind = %kind, queue = %queue, "Link queued");
        }

        let seen = self.frontier.lock().expect("frontier lock poisoned").seen_count();
        info!(url = %task.url, published, seen, "Discovery pass complete");
        Ok(())
    }

    fn in_allowed_domain(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.ends_with(self.allowed_domain.as_str())))
            .unwrap_or(false)
    }
}

/// Resolve every anchor on the page against the base URL. Synchronous on
/// purpose: the parsed document is not `Send` and must not live across an
/// await point.
fn extract_links(html: &str, base_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let anchor = Selector::parse("a[href]").expect("static selector");

    let mut links = Vec::new();
    for element in document.select(&anchor) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:") {
            continue;
        }
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        if resolved.scheme() == "http" || resolved.scheme() == "https" {
            links.push(resolved.to_string());
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBroker;

    fn html_with_links() -> &'static str {
        r##"<html><body>
            <a href="/manchester-city/transfers/verein/281">City transfers</a>
            <a href="/erling-haaland/profil/spieler/418560">Haaland</a>
            <a href="/manchester-city/startseite/verein/281">City</a>
            <a href="https://www.transfermarkt.com/premier-league/startseite/wettbewerb/GB1">PL</a>
            <a href="https://elsewhere.example.com/foo/profil/spieler/1">offsite</a>
            <a href="#anchor">anchor</a>
            <a href="mailto:x@example.com">mail</a>
            <a href="/some/news/article">news</a>
        </body></html>"##
    }

    #[test]
    fn link_extraction_resolves_and_filters_schemes() {
        let links = extract_links(html_with_links(), "https://www.transfermarkt.com/start");
        assert!(links
            .iter()
            .any(|l| l.ends_with("/manchester-city/transfers/verein/281")));
        assert!(!links.iter().any(|l| l.contains("mailto")));
        assert!(!links.iter().any(|l| l.contains('#')));
    }

    fn test_settings() -> Settings {
        Settings::default()
    }

    #[tokio::test]
    async fn high_value_links_route_to_the_extraction_queue() {
        let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());
        let settings = test_settings();
        let worker = DiscoveryWorker::new(&settings, Arc::clone(&broker)).unwrap();

        // Drive the routing logic directly, bypassing the fetch.
        let base = "https://www.transfermarkt.com/start";
        for link in extract_links(html_with_links(), base) {
            if !worker.in_allowed_domain(&link) {
                continue;
            }
            let normalized = normalize_url(&link);
            let kind = worker.classifier.classify(&normalized);
            if kind == PageKind::Unknown {
                continue;
            }
            let queue = if is_high_value(kind) {
                settings.broker.extraction_queue.clone()
            } else {
                settings.broker.discovery_queue.clone()
            };
            let task = Task::new(&normalized, kind, priority_for(kind));
            let priority = task.priority;
            broker
                .publish(&queue, serde_json::to_value(&task).unwrap(), priority)
                .await
                .unwrap();
        }

        // The transfers page and player profile go to extraction; the club
        // profile and the league page keep expanding the frontier; the
        // offsite link is rejected.
        assert_eq!(broker.depth(&settings.broker.extraction_queue).await.unwrap(), 2);
        assert_eq!(broker.depth(&settings.broker.discovery_queue).await.unwrap(), 2);
    }

    #[test]
    fn offsite_links_are_rejected() {
        let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());
        let worker = DiscoveryWorker::new(&test_settings(), broker).unwrap();
        assert!(worker.in_allowed_domain("https://www.transfermarkt.com/a/profil/spieler/1"));
        assert!(!worker.in_allowed_domain("https://elsewhere.example.com/a/profil/spieler/1"));
    }
}
