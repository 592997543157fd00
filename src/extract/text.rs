use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

use crate::crawler::records::{Currency, Position, TransferType};

/// Collapse whitespace runs and trim.
pub fn clean_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Player,
    Club,
    League,
}

/// Extract the canonical site ID from a URL for the given entity type.
///
/// `/profil/spieler/418560` -> `418560`, `/startseite/verein/281` -> `281`,
/// `/wettbewerb/GB1` -> `GB1`.
pub fn extract_entity_id(url: &str, entity: EntityKind) -> Option<String> {
    static PLAYER: OnceLock<Regex> = OnceLock::new();
    static CLUB: OnceLock<Regex> = OnceLock::new();
    static LEAGUE: OnceLock<Regex> = OnceLock::new();

    let pattern = match entity {
        EntityKind::Player => {
            PLAYER.get_or_init(|| Regex::new(r"/(?:profil|transfers)?/?spieler/(\d+)").unwrap())
        }
        EntityKind::Club => {
            CLUB.get_or_init(|| Regex::new(r"/(?:startseite|transfers)?/?verein/(\d+)").unwrap())
        }
        EntityKind::League => {
            LEAGUE.get_or_init(|| Regex::new(r"/wettbewerb/([A-Z0-9]+)").unwrap())
        }
    };

    pattern.captures(url).map(|caps| caps[1].to_string())
}

/// Parse a money string into (amount in millions, currency, disclosed).
///
/// `€15.5m` -> (15.5, EUR, true); `€500k` -> (0.5, EUR, true);
/// `free transfer` / `undisclosed` / `-` -> (None, EUR, false).
pub fn parse_money(text: &str) -> (Option<f64>, Currency, bool) {
    let trimmed = text.trim().to_lowercase();
    if trimmed.is_empty() {
        return (None, Currency::Eur, false);
    }

    if matches!(
        trimmed.as_str(),
        "free transfer" | "free" | "loan" | "end of loan" | "undisclosed" | "-" | "?" | "n/a"
    ) {
        return (None, Currency::Eur, false);
    }

    let currency = if trimmed.contains('€') {
        Currency::Eur
    } else if trimmed.contains('£') {
        Currency::Gbp
    } else if trimmed.contains('$') {
        Currency::Usd
    } else {
        Currency::Eur
    };

    static AMOUNT: OnceLock<Regex> = OnceLock::new();
    let pattern = AMOUNT.get_or_init(|| Regex::new(r"([\d.,]+)\s*(m|k|bn)?").unwrap());

    let Some(caps) = pattern.captures(&trimmed) else {
        return (None, currency, false);
    };

    let digits = caps[1].replace(',', ".");
    let Ok(raw) = digits.parse::<f64>() else {
        return (None, currency, false);
    };

    let millions = match caps.get(2).map(|m| m.as_str()) {
        Some("m") => raw,
        Some("k") => raw / 1_000.0,
        Some("bn") => raw * 1_000.0,
        // Bare numbers on fee cells are already in millions on this site.
        _ => raw,
    };

    (Some(millions), currency, true)
}

/// Normalize a date string to ISO `YYYY-MM-DD`. Accepts the site's
/// "Jul 1, 1999" form, dotted European dates, and pass-through ISO.
pub fn parse_date(text: &str) -> Option<String> {
    let cleaned = clean_text(text);

    for format in ["%b %d, %Y", "%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(&cleaned, format) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }

    None
}

/// Map the site's position labels to the normalized enum.
pub fn normalize_position(text: &str) -> Position {
    let lower = text.trim().to_lowercase();

    if lower.contains("goalkeeper") {
        Position::GK
    } else if lower.contains("centre-back") || lower.contains("center-back") {
        Position::CB
    } else if lower.contains("left-back") {
        Position::LB
    } else if lower.contains("right-back") {
        Position::RB
    } else if lower.contains("defensive midfield") {
        Position::DM
    } else if lower.contains("central midfield") {
        Position::CM
    } else if lower.contains("attacking midfield") {
        Position::AM
    } else if lower.contains("left winger") {
        Position::LW
    } else if lower.contains("right winger") {
        Position::RW
    } else if lower.contains("centre-forward") || lower.contains("center-forward") {
        Position::CF
    } else if lower.contains("striker") || lower.contains("forward") {
        Position::ST
    } else if lower.contains("defender") {
        Position::CB
    } else if lower.contains("midfield") {
        Position::CM
    } else {
        Position::Unknown
    }
}

pub fn normalize_transfer_type(text: &str) -> TransferType {
    let lower = text.trim().to_lowercase();

    if lower.contains("end of loan") {
        TransferType::EndOfLoan
    } else if lower.contains("loan") {
        TransferType::Loan
    } else if lower.contains("free") {
        TransferType::Free
    } else if lower.is_empty() {
        TransferType::Unknown
    } else {
        TransferType::Permanent
    }
}

/// Parse a height like "1,94 m" or "194 cm" into centimeters.
pub fn parse_height_cm(text: &str) -> Option<u32> {
    static HEIGHT: OnceLock<Regex> = OnceLock::new();
    let pattern = HEIGHT.get_or_init(|| Regex::new(r"(\d+)[.,]?(\d*)\s*(m|cm)").unwrap());

    let lower = text.to_lowercase();
    let caps = pattern.captures(&lower)?;
    let whole: u32 = caps[1].parse().ok()?;
    let decimal = caps.get(2).map(|m| m.as_str()).unwrap_or("");

    match &caps[3] {
        "m" => {
            let mut cm = whole * 100;
            if let Ok(frac) = decimal.parse::<u32>() {
                // "1,94" carries two decimals, "1,9" one.
                cm += if decimal.len() >= 2 { frac } else { frac * 10 };
            }
            Some(cm)
        }
        _ => Some(whole),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_with_currency_and_magnitude() {
        assert_eq!(parse_money("€15.5m"), (Some(15.5), Currency::Eur, true));
        assert_eq!(parse_money("€500k"), (Some(0.5), Currency::Eur, true));
        assert_eq!(parse_money("£20m"), (Some(20.0), Currency::Gbp, true));
        assert_eq!(parse_money("$10.5m"), (Some(10.5), Currency::Usd, true));
    }

    #[test]
    fn money_special_cases_are_undisclosed() {
        assert_eq!(parse_money("free transfer"), (None, Currency::Eur, false));
        assert_eq!(parse_money("loan"), (None, Currency::Eur, false));
        assert_eq!(parse_money("undisclosed"), (None, Currency::Eur, false));
        assert_eq!(parse_money("-"), (None, Currency::Eur, false));
        assert_eq!(parse_money(""), (None, Currency::Eur, false));
    }

    #[test]
    fn entity_ids_from_urls() {
        assert_eq!(
            extract_entity_id("/x/profil/spieler/418560", EntityKind::Player),
            Some("418560".to_string())
        );
        assert_eq!(
            extract_entity_id("/x/transfers/spieler/99", EntityKind::Player),
            Some("99".to_string())
        );
        assert_eq!(
            extract_entity_id("/x/startseite/verein/281", EntityKind::Club),
            Some("281".to_string())
        );
        assert_eq!(
            extract_entity_id("/wettbewerb/GB1", EntityKind::League),
            Some("GB1".to_string())
        );
        assert_eq!(extract_entity_id("/news/today", EntityKind::Player), None);
    }

    #[test]
    fn dates_normalize_to_iso() {
        assert_eq!(parse_date("Jul 1, 1999"), Some("1999-07-01".to_string()));
        assert_eq!(parse_date("1999-07-01"), Some("1999-07-01".to_string()));
        assert_eq!(parse_date("01.07.1999"), Some("1999-07-01".to_string()));
        assert_eq!(parse_date("sometime"), None);
    }

    #[test]
    fn positions_normalize() {
        assert_eq!(normalize_position("Goalkeeper"), Position::GK);
        assert_eq!(normalize_position("Centre-Back"), Position::CB);
        assert_eq!(normalize_position("Defensive Midfield"), Position::DM);
        assert_eq!(normalize_position("Centre-Forward"), Position::CF);
        assert_eq!(normalize_position("Striker"), Position::ST);
        assert_eq!(normalize_position("Libero?"), Position::Unknown);
    }

    #[test]
    fn transfer_types_normalize() {
        assert_eq!(normalize_transfer_type("End of loan"), TransferType::EndOfLoan);
        assert_eq!(normalize_transfer_type("Loan"), TransferType::Loan);
        assert_eq!(normalize_transfer_type("free transfer"), TransferType::Free);
        assert_eq!(normalize_transfer_type("€12m"), TransferType::Permanent);
    }

    #[test]
    fn heights_in_meters_and_centimeters() {
        assert_eq!(parse_height_cm("1,94 m"), Some(194));
        assert_eq!(parse_height_cm("194 cm"), Some(194));
        assert_eq!(parse_height_cm("tall"), None);
    }

    #[test]
    fn whitespace_collapses() {
        assert_eq!(clean_text("  Erling \n  Haaland  "), "Erling Haaland");
    }
}
