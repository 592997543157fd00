use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Currency codes seen in fee and market value strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "EUR")]
    Eur,
    #[serde(rename = "GBP")]
    Gbp,
    #[serde(rename = "USD")]
    Usd,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl Default for Currency {
    fn default() -> Self {
        Currency::Eur
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferType {
    Permanent,
    Loan,
    Free,
    EndOfLoan,
    Unknown,
}

impl Default for TransferType {
    fn default() -> Self {
        TransferType::Unknown
    }
}

/// Normalized player positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    GK,
    CB,
    LB,
    RB,
    DM,
    CM,
    AM,
    LW,
    RW,
    CF,
    ST,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl Default for Position {
    fn default() -> Self {
        Position::Unknown
    }
}

/// Transfer fee details, amounts in millions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fee {
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: Currency,
    #[serde(default = "default_true")]
    pub is_disclosed: bool,
    #[serde(default)]
    pub has_addons: bool,
    #[serde(default)]
    pub is_loan_fee: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    #[serde(default)]
    pub site_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub nationality: Option<String>,
    #[serde(default)]
    pub height_cm: Option<u32>,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub dominant_foot: Option<String>,
    #[serde(default)]
    pub current_club: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

impl Default for Player {
    fn default() -> Self {
        Self {
            site_id: None,
            name: None,
            date_of_birth: None,
            nationality: None,
            height_cm: None,
            position: Position::Unknown,
            dominant_foot: None,
            current_club: None,
            scraped_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Club {
    #[serde(default)]
    pub site_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub league: Option<String>,
    #[serde(default)]
    pub division: Option<i32>,
    pub scraped_at: DateTime<Utc>,
}

impl Default for Club {
    fn default() -> Self {
        Self {
            site_id: None,
            name: None,
            country: None,
            league: None,
            division: None,
            scraped_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    #[serde(default)]
    pub player_site_id: Option<String>,
    #[serde(default)]
    pub player_name: Option<String>,
    #[serde(default)]
    pub from_club: Option<String>,
    #[serde(default)]
    pub from_club_site_id: Option<String>,
    #[serde(default)]
    pub to_club: Option<String>,
    #[serde(default)]
    pub to_club_site_id: Option<String>,
    #[serde(default)]
    pub transfer_date: Option<String>,
    #[serde(default)]
    pub season: Option<String>,
    #[serde(default)]
    pub transfer_type: TransferType,
    #[serde(default)]
    pub fee: Option<Fee>,
    #[serde(default)]
    pub market_value_at_transfer: Option<f64>,
    pub source_url: String,
    pub scraped_at: DateTime<Utc>,
}

impl Transfer {
    pub fn for_source(source_url: &str) -> Self {
        Self {
            player_site_id: None,
            player_name: None,
            from_club: None,
            from_club_site_id: None,
            to_club: None,
            to_club_site_id: None,
            transfer_date: None,
            season: None,
            transfer_type: TransferType::Unknown,
            fee: None,
            market_value_at_transfer: None,
            source_url: source_url.to_string(),
            scraped_at: Utc::now(),
        }
    }
}
