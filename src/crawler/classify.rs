use regex::Regex;

use crate::crawler::task::{PageKind, TaskPriority};

/// URL-pattern classifier for transfer-site pages. Pure and swappable:
/// workers only see [`LinkClassifier::classify`],
/// [`LinkClassifier::extract_site_id`], [`priority_for`] and
/// [`is_high_value`].
pub struct LinkClassifier {
    patterns: Vec<(PageKind, Regex)>,
    id_pattern: Regex,
}

impl Default for LinkClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkClassifier {
    pub fn new() -> Self {
        // Order matters: more specific patterns are tried first.
        let patterns = vec![
            (
                PageKind::LeagueIndex,
                Regex::new(r"/wettbewerbe/(europa|amerika|asien|afrika)").unwrap(),
            ),
            (
                PageKind::LeagueClubs,
                Regex::new(r"/(startseite|vereine)/wettbewerb/\w+").unwrap(),
            ),
            (
                PageKind::ClubProfile,
                Regex::new(r"/[a-z\-]+/startseite/verein/\d+").unwrap(),
            ),
            (
                PageKind::ClubTransfers,
                Regex::new(r"/[a-z\-]+/(transfers|zugaenge)/verein/\d+").unwrap(),
            ),
            (
                PageKind::PlayerProfile,
                Regex::new(r"/[a-z\-]+/profil/spieler/\d+").unwrap(),
            ),
            (
                PageKind::PlayerTransfers,
                Regex::new(r"/[a-z\-]+/transfers/spieler/\d+").unwrap(),
            ),
            (
                PageKind::CompetitionPage,
                Regex::new(r"/wettbewerb/\w+").unwrap(),
            ),
        ];

        let id_pattern = Regex::new(r"/(spieler|verein|wettbewerb)/(\w+)").unwrap();

        Self { patterns, id_pattern }
    }

    /// Classify a URL into a page kind by pattern matching.
    pub fn classify(&self, url: &str) -> PageKind {
        for (kind, pattern) in &self.patterns {
            if pattern.is_match(url) {
                return *kind;
            }
        }
        PageKind::Unknown
    }

    /// Extract the site's record identifier from a URL, if present.
    pub fn extract_site_id(&self, url: &str) -> Option<String> {
        self.id_pattern
            .captures(url)
            .map(|caps| caps[2].to_string())
    }
}

/// Static kind -> priority table for newly discovered links.
pub fn priority_for(kind: PageKind) -> TaskPriority {
    match kind {
        PageKind::LeagueIndex => TaskPriority::Critical,
        PageKind::LeagueClubs => TaskPriority::High,
        PageKind::ClubTransfers => TaskPriority::High,
        PageKind::PlayerTransfers => TaskPriority::Medium,
        PageKind::ClubProfile => TaskPriority::Medium,
        PageKind::PlayerProfile => TaskPriority::Medium,
        PageKind::CompetitionPage => TaskPriority::Low,
        PageKind::Unknown => TaskPriority::Low,
    }
}

/// Kinds routed straight to the extraction queue instead of back into
/// discovery. Everything else keeps expanding the frontier.
pub fn is_high_value(kind: PageKind) -> bool {
    matches!(
        kind,
        PageKind::ClubTransfers | PageKind::PlayerTransfers | PageKind::PlayerProfile
    )
}
