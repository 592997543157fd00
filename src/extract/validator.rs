use serde_json::Value;

use crate::crawler::task::{PageKind, ValidationReport};

const HEIGHT_MIN_CM: u64 = 150;
const HEIGHT_MAX_CM: u64 = 220;
/// Fees are in millions; nothing real has ever crossed this.
const FEE_SUSPICION_THRESHOLD: f64 = 500.0;

const KNOWN_CURRENCIES: &[&str] = &["EUR", "GBP", "USD", "UNKNOWN"];

/// Advisory check over an extraction payload. Warnings and a confidence
/// score only; results are persisted regardless of what this finds.
pub fn validate(data: &Value, kind: PageKind) -> ValidationReport {
    let mut report = ValidationReport::clean();

    match kind {
        PageKind::PlayerProfile => validate_player(data, &mut report),
        PageKind::PlayerTransfers | PageKind::ClubTransfers => {
            validate_transfers(data, kind, &mut report)
        }
        PageKind::ClubProfile => validate_club(data, &mut report),
        _ => {}
    }

    if !report.warnings.is_empty() {
        report.needs_review = true;
        let penalty = 0.1 * report.warnings.len() as f64;
        report.confidence = (report.confidence - penalty).max(0.3);
    }

    report
}

fn validate_player(data: &Value, report: &mut ValidationReport) {
    let player = data.get("player").unwrap_or(data);

    if player.get("site_id").and_then(Value::as_str).map_or(true, str::is_empty) {
        report.warn("player site_id is missing");
    }
    if player.get("name").and_then(Value::as_str).map_or(true, str::is_empty) {
        report.warn("player name is missing");
    }

    if let Some(height) = player.get("height_cm").and_then(Value::as_u64) {
        if !(HEIGHT_MIN_CM..=HEIGHT_MAX_CM).contains(&height) {
            report.warn(format!("implausible height_cm: {height}"));
        }
    }

    if let Some(dob) = player.get("date_of_birth") {
        if !dob.is_null() && !dob.is_string() {
            report.warn("date_of_birth is not a string");
        }
    }
}

fn validate_club(data: &Value, report: &mut ValidationReport) {
    let club = data.get("club").unwrap_or(data);

    if club.get("site_id").and_then(Value::as_str).map_or(true, str::is_empty) {
        report.warn("club site_id is missing");
    }
    if club.get("name").and_then(Value::as_str).map_or(true, str::is_empty) {
        report.warn("club name is missing");
    }
}

fn validate_transfers(data: &Value, kind: PageKind, report: &mut ValidationReport) {
    let Some(rows) = data.get("transfers").and_then(Value::as_array) else {
        report.warn("transfers list is missing");
        return;
    };

    if rows.is_empty() {
        // An empty window is legitimate but worth a second look.
        report.warn("transfers list is empty");
        report.confidence = 0.6;
        return;
    }

    for (index, row) in rows.iter().enumerate() {
        if kind == PageKind::PlayerTransfers {
            let from_missing =
                row.get("from_club").and_then(Value::as_str).map_or(true, str::is_empty);
            let to_missing =
                row.get("to_club").and_then(Value::as_str).map_or(true, str::is_empty);
            if from_missing && to_missing {
                report.warn(format!("transfer {index} has neither club"));
            }
        } else if row.get("player_name").and_then(Value::as_str).map_or(true, str::is_empty) {
            report.warn(format!("transfer {index} has no player name"));
        }

        if let Some(fee) = row.get("fee").filter(|f| !f.is_null()) {
            if let Some(amount) = fee.get("amount").and_then(Value::as_f64) {
                if amount > FEE_SUSPICION_THRESHOLD {
                    report.warn(format!("transfer {index} fee {amount} looks like raw units"));
                }
                if amount < 0.0 {
                    report.warn(format!("transfer {index} has a negative fee"));
                }
            }
            if let Some(currency) = fee.get("currency").and_then(Value::as_str) {
                if !KNOWN_CURRENCIES.contains(&currency) {
                    report.warn(format!("transfer {index} has unknown currency {currency}"));
                }
            }
        }
    }
}
