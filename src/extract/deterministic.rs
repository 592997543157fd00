use scraper::{Html, Selector};
use serde_json::{json, Value};

use super::text::{
    clean_text, extract_entity_id, normalize_transfer_type, parse_date, parse_height_cm,
    parse_money, EntityKind,
};
use super::ExtractError;

fn selector(css: &str) -> Selector {
    // All selectors here are compile-time constants.
    Selector::parse(css).unwrap()
}

/// Parse a player profile page without calling the inference backend.
///
/// Reads the data header headline plus the label/value info table. Fails
/// with a selector miss when the page layout has shifted so the caller
/// can fall back to the generative path.
pub fn parse_player_profile(html: &str, url: &str) -> Result<Value, ExtractError> {
    let document = Html::parse_document(html);

    let site_id = extract_entity_id(url, EntityKind::Player)
        .ok_or_else(|| ExtractError::MissingMarker("player id in url".to_string()))?;

    let headline = selector("h1.data-header__headline-wrapper");
    let name = document
        .select(&headline)
        .next()
        .or_else(|| document.select(&selector("h1")).next())
        .map(|el| clean_text(&el.text().collect::<String>()))
        .filter(|text| !text.is_empty())
        .ok_or_else(|| ExtractError::SelectorMiss("player name headline".to_string()))?;

    // Shirt numbers render inside the headline as "#9 Erling Haaland".
    let name = name
        .split_once(' ')
        .filter(|(first, _)| first.starts_with('#'))
        .map(|(_, rest)| rest.to_string())
        .unwrap_or(name);

    let label_sel = selector("span.info-table__content--label");
    let value_sel = selector("span.info-table__content--regular");
    let labels: Vec<String> = document
        .select(&label_sel)
        .map(|el| clean_text(&el.text().collect::<String>()).to_lowercase())
        .collect();
    let values: Vec<String> = document
        .select(&value_sel)
        .map(|el| clean_text(&el.text().collect::<String>()))
        .collect();

    if labels.is_empty() {
        return Err(ExtractError::SelectorMiss("player info table".to_string()));
    }

    let mut date_of_birth = None;
    let mut height_cm = None;
    let mut nationality = None;
    let mut position = None;
    let mut dominant_foot = None;
    let mut current_club = None;

    for (label, value) in labels.iter().zip(values.iter()) {
        if value.is_empty() {
            continue;
        }
        if label.contains("date of birth") {
            // The cell sometimes appends the age: "Jul 21, 2000 (25)".
            let date_part = value.split('(').next().unwrap_or(value);
            date_of_birth = parse_date(date_part);
        } else if label.contains("height") {
            height_cm = parse_height_cm(value);
        } else if label.contains("citizenship") || label.contains("nationality") {
            nationality = Some(value.split_whitespace().collect::<Vec<_>>().join(" "));
        } else if label.contains("position") {
            position = Some(value.clone());
        } else if label.contains("foot") {
            dominant_foot = Some(value.to_lowercase());
        } else if label.contains("current club") {
            current_club = Some(value.clone());
        }
    }

    Ok(json!({
        "player": {
            "site_id": site_id,
            "name": name,
            "date_of_birth": date_of_birth,
            "height_cm": height_cm,
            "nationality": nationality,
            "position": position,
            "dominant_foot": dominant_foot,
            "current_club": current_club,
        }
    }))
}

/// Parse a club transfer list page. Each row of the items table carries
/// the player link, row cells with partner club and fee.
pub fn parse_club_transfers(html: &str, url: &str) -> Result<Value, ExtractError> {
    let document = Html::parse_document(html);

    let site_id = extract_entity_id(url, EntityKind::Club)
        .ok_or_else(|| ExtractError::MissingMarker("club id in url".to_string()))?;

    let headline = selector("h1.data-header__headline-wrapper");
    let club_name = document
        .select(&headline)
        .next()
        .or_else(|| document.select(&selector("h1")).next())
        .map(|el| clean_text(&el.text().collect::<String>()));

    let row_sel = selector("table.items tbody tr");
    let player_sel = selector("td.hauptlink a");
    let cell_sel = selector("td");

    let mut transfers = Vec::new();
    let mut saw_table = false;

    for row in document.select(&row_sel) {
        saw_table = true;

        let Some(player_link) = row.select(&player_sel).next() else {
            continue;
        };
        let player_name = clean_text(&player_link.text().collect::<String>());
        if player_name.is_empty() {
            continue;
        }
        let player_site_id = player_link
            .value()
            .attr("href")
            .and_then(|href| extract_entity_id(href, EntityKind::Player));

        let cells: Vec<String> = row
            .select(&cell_sel)
            .map(|el| clean_text(&el.text().collect::<String>()))
            .collect();

        // Fee sits in the rightmost cell of each row.
        let fee_text = cells.last().cloned().unwrap_or_default();
        let (amount, currency, is_disclosed) = parse_money(&fee_text);
        let transfer_type = normalize_transfer_type(&fee_text);

        // The partner club link is the second hauptlink in the row.
        let partner_club = row
            .select(&player_sel)
            .nth(1)
            .map(|el| clean_text(&el.text().collect::<String>()))
            .filter(|text| !text.is_empty() && text != &player_name);

        transfers.push(json!({
            "player_name": player_name,
            "player_site_id": player_site_id,
            "partner_club": partner_club,
            "transfer_type": transfer_type,
            "fee": {
                "amount": amount,
                "currency": currency,
                "is_disclosed": is_disclosed,
            },
        }));
    }

    if !saw_table {
        return Err(ExtractError::SelectorMiss("transfer items table".to_string()));
    }

    Ok(json!({
        "club_site_id": site_id,
        "club_name": club_name,
        "transfers": transfers,
    }))
}
