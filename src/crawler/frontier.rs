use std::collections::HashSet;
use tracing::debug;
use url::Url;

/// In-process record of already-fetched locators. Best-effort only: it is
/// not shared across worker processes and does not survive a restart, so
/// duplicate fetches across processes are possible and accepted.
#[derive(Debug, Default)]
pub struct Frontier {
    seen: HashSet<String>,
}

impl Frontier {
    pub fn new() -> Self {
        Self { seen: HashSet::new() }
    }

    /// True if the URL (in canonical form) has already been fetched.
    pub fn already_seen(&self, url: &str) -> bool {
        self.seen.contains(&normalize_url(url))
    }

    /// Record a URL as fetched. Returns false if it was already present.
    pub fn mark_seen(&mut self, url: &str) -> bool {
        let normalized = normalize_url(url);
        let fresh = self.seen.insert(normalized);
        if !fresh {
            debug!(url, "url already seen");
        }
        fresh
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

/// Normalize a URL to its canonical form so trivially different spellings
/// of the same locator collapse: lowercase host, default ports and
/// fragments stripped, bare-root path removed, query keys sorted.
pub fn normalize_url(url: &str) -> String {
    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(_) => return url.to_string(),
    };

    let mut normalized = parsed;

    if let Some(port) = normalized.port() {
        if (normalized.scheme() == "http" && port == 80)
            || (normalized.scheme() == "https" && port == 443)
        {
            let _ = normalized.set_port(None);
        }
    }

    if normalized.path() == "/" {
        normalized.set_path("");
    }

    if let Some(host) = normalized.host_str() {
        let lower = host.to_lowercase();
        if host != lower {
            let _ = normalized.set_host(Some(&lower));
        }
    }

    if let Some(query) = normalized.query() {
        if !query.is_empty() {
            let mut params: Vec<(String, String)> = query
                .split('&')
                .map(|pair| {
                    let mut kv = pair.splitn(2, '=');
                    (
                        kv.next().unwrap_or("").to_string(),
                        kv.next().unwrap_or("").to_string(),
                    )
                })
                .collect();
            params.sort_by(|a, b| a.0.cmp(&b.0));

            let sorted = params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            normalized.set_query(Some(&sorted));
        }
    }

    normalized.set_fragment(None);

    normalized.to_string()
}
