use std::collections::HashMap;

use serde_json::{Map, Value};

use super::deterministic;
use super::text::{
    extract_entity_id, normalize_position, normalize_transfer_type, parse_date, EntityKind,
};
use super::ExtractError;
use crate::crawler::records::{Club, Currency, Fee, Player, Transfer, TransferType};
use crate::crawler::task::{ExtractionResult, PageKind};

/// Everything the extraction pipeline needs to handle one page kind:
/// the schema handed to the inference backend, the optional deterministic
/// parser, and how the raw payload maps onto typed records.
pub trait PageStrategy: Send + Sync {
    /// JSON schema description included in the generative prompt.
    fn schema(&self) -> &'static str;

    /// Deterministic parse. Strategies without one return
    /// [`ExtractError::Unsupported`] so the caller goes generative directly.
    fn parse(&self, html: &str, url: &str) -> Result<Value, ExtractError>;

    /// Map an extraction payload (from either path) onto the typed
    /// record collections of the result.
    fn populate(&self, url: &str, data: &Value, result: &mut ExtractionResult);

    /// Field names the repair worker asks the inference backend to find
    /// new selectors for.
    fn repair_fields(&self) -> &'static [&'static str];
}

pub struct Registry {
    strategies: HashMap<PageKind, Box<dyn PageStrategy>>,
}

impl Registry {
    pub fn with_default_strategies() -> Self {
        let mut strategies: HashMap<PageKind, Box<dyn PageStrategy>> = HashMap::new();
        strategies.insert(PageKind::PlayerProfile, Box::new(PlayerProfileStrategy));
        strategies.insert(PageKind::PlayerTransfers, Box::new(PlayerTransfersStrategy));
        strategies.insert(PageKind::ClubTransfers, Box::new(ClubTransfersStrategy));
        strategies.insert(PageKind::ClubProfile, Box::new(ClubProfileStrategy));
        Self { strategies }
    }

    pub fn get(&self, kind: PageKind) -> Option<&dyn PageStrategy> {
        self.strategies.get(&kind).map(|s| s.as_ref())
    }

    pub fn supports(&self, kind: PageKind) -> bool {
        self.strategies.contains_key(&kind)
    }
}

fn get_str(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn get_f64(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(Value::as_f64)
}

fn get_u32(value: &Value, key: &str) -> Option<u32> {
    value.get(key).and_then(Value::as_u64).map(|n| n as u32)
}

/// Fee amounts are stored in millions. Generative output sometimes comes
/// back in raw units; anything over this threshold gets rescaled.
const RAW_FEE_THRESHOLD: f64 = 10_000.0;

fn fee_from_value(value: &Value) -> Option<Fee> {
    let fee_obj = value.get("fee")?;
    if fee_obj.is_null() {
        return None;
    }

    let mut amount = get_f64(fee_obj, "amount");
    if let Some(raw) = amount {
        if raw > RAW_FEE_THRESHOLD {
            amount = Some(raw / 1_000_000.0);
        }
    }

    let currency = fee_obj
        .get("currency")
        .and_then(|c| serde_json::from_value::<Currency>(c.clone()).ok())
        .unwrap_or_default();

    Some(Fee {
        amount,
        currency,
        is_disclosed: fee_obj
            .get("is_disclosed")
            .and_then(Value::as_bool)
            .unwrap_or(amount.is_some()),
        has_addons: fee_obj.get("has_addons").and_then(Value::as_bool).unwrap_or(false),
        is_loan_fee: fee_obj.get("is_loan_fee").and_then(Value::as_bool).unwrap_or(false),
        notes: get_str(fee_obj, "notes"),
    })
}

fn transfer_type_from_value(value: &Value) -> TransferType {
    value
        .get("transfer_type")
        .and_then(Value::as_str)
        .map(normalize_transfer_type)
        .unwrap_or_default()
}

struct PlayerProfileStrategy;

impl PageStrategy for PlayerProfileStrategy {
    fn schema(&self) -> &'static str {
        r#"{
  "player": {
    "site_id": "string, the numeric player id from the URL",
    "name": "string, full player name",
    "date_of_birth": "string YYYY-MM-DD or null",
    "height_cm": "integer or null",
    "nationality": "string or null",
    "position": "string, e.g. Centre-Forward, or null",
    "dominant_foot": "string left/right/both or null",
    "current_club": "string or null"
  }
}"#
    }

    fn parse(&self, html: &str, url: &str) -> Result<Value, ExtractError> {
        deterministic::parse_player_profile(html, url)
    }

    fn populate(&self, url: &str, data: &Value, result: &mut ExtractionResult) {
        let source = data.get("player").unwrap_or(data);

        let player = Player {
            site_id: get_str(source, "site_id")
                .or_else(|| extract_entity_id(url, EntityKind::Player)),
            name: get_str(source, "name"),
            date_of_birth: get_str(source, "date_of_birth").and_then(|d| parse_date(&d)),
            nationality: get_str(source, "nationality"),
            height_cm: get_u32(source, "height_cm"),
            position: source
                .get("position")
                .and_then(Value::as_str)
                .map(normalize_position)
                .unwrap_or_default(),
            dominant_foot: get_str(source, "dominant_foot"),
            current_club: get_str(source, "current_club"),
            ..Player::default()
        };
        result.players.push(player);
    }

    fn repair_fields(&self) -> &'static [&'static str] {
        &["name", "date_of_birth", "height_cm", "nationality", "position", "current_club"]
    }
}

struct PlayerTransfersStrategy;

impl PageStrategy for PlayerTransfersStrategy {
    fn schema(&self) -> &'static str {
        r#"{
  "player_site_id": "string, the numeric player id from the URL",
  "player_name": "string",
  "transfers": [
    {
      "season": "string like 24/25 or null",
      "transfer_date": "string YYYY-MM-DD or null",
      "from_club": "string or null",
      "to_club": "string or null",
      "transfer_type": "permanent | loan | free | end_of_loan",
      "market_value_at_transfer": "number in millions or null",
      "fee": {"amount": "number in millions or null", "currency": "EUR | GBP | USD", "is_disclosed": "bool"}
    }
  ]
}"#
    }

    fn parse(&self, _html: &str, _url: &str) -> Result<Value, ExtractError> {
        Err(ExtractError::Unsupported(PageKind::PlayerTransfers))
    }

    fn populate(&self, url: &str, data: &Value, result: &mut ExtractionResult) {
        let player_site_id =
            get_str(data, "player_site_id").or_else(|| extract_entity_id(url, EntityKind::Player));
        let player_name = get_str(data, "player_name");

        let Some(rows) = data.get("transfers").and_then(Value::as_array) else {
            return;
        };

        for row in rows {
            let mut transfer = Transfer::for_source(url);
            transfer.player_site_id = player_site_id.clone();
            transfer.player_name = player_name.clone();
            transfer.season = get_str(row, "season");
            transfer.transfer_date = get_str(row, "transfer_date").and_then(|d| parse_date(&d));
            transfer.from_club = get_str(row, "from_club");
            transfer.to_club = get_str(row, "to_club");
            transfer.transfer_type = transfer_type_from_value(row);
            transfer.market_value_at_transfer = get_f64(row, "market_value_at_transfer");
            transfer.fee = fee_from_value(row);
            result.transfers.push(transfer);
        }
    }

    fn repair_fields(&self) -> &'static [&'static str] {
        &["transfers", "season", "from_club", "to_club", "fee"]
    }
}

struct ClubTransfersStrategy;

impl PageStrategy for ClubTransfersStrategy {
    fn schema(&self) -> &'static str {
        r#"{
  "club_site_id": "string, the numeric club id from the URL",
  "club_name": "string",
  "transfers": [
    {
      "player_name": "string",
      "player_site_id": "string or null",
      "partner_club": "string, the other club in the deal, or null",
      "transfer_type": "permanent | loan | free | end_of_loan",
      "fee": {"amount": "number in millions or null", "currency": "EUR | GBP | USD", "is_disclosed": "bool"}
    }
  ]
}"#
    }

    fn parse(&self, html: &str, url: &str) -> Result<Value, ExtractError> {
        deterministic::parse_club_transfers(html, url)
    }

    fn populate(&self, url: &str, data: &Value, result: &mut ExtractionResult) {
        let club_name = get_str(data, "club_name");

        let Some(rows) = data.get("transfers").and_then(Value::as_array) else {
            return;
        };

        for row in rows {
            let mut transfer = Transfer::for_source(url);
            transfer.player_name = get_str(row, "player_name");
            transfer.player_site_id = get_str(row, "player_site_id");
            // Without arrivals/departures context the deal is recorded from
            // the page club's side, partner club on the opposite end.
            transfer.to_club = club_name.clone();
            transfer.from_club = get_str(row, "partner_club");
            transfer.transfer_type = transfer_type_from_value(row);
            transfer.fee = fee_from_value(row);
            result.transfers.push(transfer);
        }
    }

    fn repair_fields(&self) -> &'static [&'static str] {
        &["transfers", "player_name", "partner_club", "fee"]
    }
}

struct ClubProfileStrategy;

impl PageStrategy for ClubProfileStrategy {
    fn schema(&self) -> &'static str {
        r#"{
  "club": {
    "site_id": "string, the numeric club id from the URL",
    "name": "string, official club name",
    "country": "string or null",
    "league": "string, current league name, or null",
    "division": "integer tier (1 = top flight) or null"
  }
}"#
    }

    fn parse(&self, _html: &str, _url: &str) -> Result<Value, ExtractError> {
        Err(ExtractError::Unsupported(PageKind::ClubProfile))
    }

    fn populate(&self, url: &str, data: &Value, result: &mut ExtractionResult) {
        let source = data.get("club").unwrap_or(data);

        let club = Club {
            site_id: get_str(source, "site_id")
                .or_else(|| extract_entity_id(url, EntityKind::Club)),
            name: get_str(source, "name"),
            country: get_str(source, "country"),
            league: get_str(source, "league"),
            division: source.get("division").and_then(Value::as_i64).map(|n| n as i32),
            ..Club::default()
        };
        result.clubs.push(club);
    }

    fn repair_fields(&self) -> &'static [&'static str] {
        &["name", "country", "league"]
    }
}

/// Convert a payload value into the map form stored on results.
pub fn payload_map(data: &Value) -> Map<String, Value> {
    match data {
        Value::Object(map) => map.clone(),
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other.clone());
            map
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::records::Position;
    use crate::crawler::task::ExtractionBackend;
    use serde_json::json;

    fn empty_result(url: &str, kind: PageKind) -> ExtractionResult {
        ExtractionResult::succeeded(url, kind, ExtractionBackend::Deterministic, Map::new())
    }

    #[test]
    fn registry_covers_extractable_kinds() {
        let registry = Registry::with_default_strategies();
        assert!(registry.supports(PageKind::PlayerProfile));
        assert!(registry.supports(PageKind::PlayerTransfers));
        assert!(registry.supports(PageKind::ClubTransfers));
        assert!(registry.supports(PageKind::ClubProfile));
        assert!(!registry.supports(PageKind::LeagueIndex));
    }

    #[test]
    fn player_payload_populates_typed_record() {
        let registry = Registry::with_default_strategies();
        let strategy = registry.get(PageKind::PlayerProfile).unwrap();

        let url = "https://x.com/a/profil/spieler/418560";
        let mut result = empty_result(url, PageKind::PlayerProfile);
        strategy.populate(
            url,
            &json!({"player": {
                "name": "Erling Haaland",
                "position": "Centre-Forward",
                "height_cm": 194,
            }}),
            &mut result,
        );

        assert_eq!(result.players.len(), 1);
        let player = &result.players[0];
        // Missing id falls back to the URL.
        assert_eq!(player.site_id.as_deref(), Some("418560"));
        assert_eq!(player.position, Position::CF);
        assert_eq!(player.height_cm, Some(194));
    }

    #[test]
    fn raw_unit_fees_rescale_to_millions() {
        let registry = Registry::with_default_strategies();
        let strategy = registry.get(PageKind::ClubTransfers).unwrap();

        let url = "https://x.com/c/transfers/verein/281";
        let mut result = empty_result(url, PageKind::ClubTransfers);
        strategy.populate(
            url,
            &json!({"club_name": "Manchester City", "transfers": [
                {"player_name": "Somebody", "fee": {"amount": 60_000_000.0, "currency": "EUR"}},
                {"player_name": "Other", "fee": {"amount": 12.5, "currency": "GBP"}},
            ]}),
            &mut result,
        );

        let fees: Vec<Option<f64>> =
            result.transfers.iter().map(|t| t.fee.as_ref().unwrap().amount).collect();
        assert_eq!(fees, vec![Some(60.0), Some(12.5)]);
        assert_eq!(result.transfers[0].to_club.as_deref(), Some("Manchester City"));
    }

    #[test]
    fn transfer_history_rows_carry_player_identity() {
        let registry = Registry::with_default_strategies();
        let strategy = registry.get(PageKind::PlayerTransfers).unwrap();

        let url = "https://x.com/a/transfers/spieler/99";
        let mut result = empty_result(url, PageKind::PlayerTransfers);
        strategy.populate(
            url,
            &json!({"player_name": "Somebody", "transfers": [
                {"season": "24/25", "from_club": "A", "to_club": "B", "transfer_type": "loan"},
            ]}),
            &mut result,
        );

        assert_eq!(result.transfers.len(), 1);
        let transfer = &result.transfers[0];
        assert_eq!(transfer.player_site_id.as_deref(), Some("99"));
        assert_eq!(transfer.transfer_type, TransferType::Loan);
    }
}
