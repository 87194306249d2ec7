//! Condition Search Types
//!
//! Domain types for server-stored condition filters and the instruments
//! they match. These types are codec-agnostic: the Kiwoom wire messages are
//! converted into them by the infrastructure layer.
//!
//! # Normalisation
//!
//! - Instrument codes arrive with a single-letter market prefix
//!   (`A005930`); the prefix is stripped (`005930`).
//! - Last prices arrive as strings that may carry a direction sign
//!   (`+70000`, `-69900`); the magnitude is kept, unparsable values become
//!   `0.0`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Result Row Field Keys
// =============================================================================

/// Field key carrying the instrument code in a search result row.
pub const FIELD_INSTRUMENT_CODE: &str = "9001";

/// Field key carrying the instrument name in a search result row.
pub const FIELD_INSTRUMENT_NAME: &str = "302";

/// Field key carrying the last traded price in a search result row.
pub const FIELD_LAST_PRICE: &str = "10";

/// Field key carrying the prior-day change sign code in a search result row.
pub const FIELD_STATUS: &str = "25";

// =============================================================================
// Condition Definition
// =============================================================================

/// A named, server-stored filter, as returned by the list query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConditionDefinition {
    /// Condition id, used as the correlation key for searches.
    pub id: String,
    /// Display name.
    pub name: String,
}

impl ConditionDefinition {
    /// Create a new condition definition.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

// =============================================================================
// Search Parameters
// =============================================================================

/// Condition search variant.
///
/// Both variants share the `CNSRREQ` message type but carry different
/// parameter sets and have different expected latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SearchMode {
    /// One-shot search with exchange scope and continuation (`search_type = "0"`).
    #[default]
    General,
    /// Realtime registration search (`search_type = "1"`).
    Realtime,
}

impl SearchMode {
    /// Wire value of `search_type`.
    #[must_use]
    pub const fn search_type(&self) -> &'static str {
        match self {
            Self::General => "0",
            Self::Realtime => "1",
        }
    }

    /// Short name for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Realtime => "realtime",
        }
    }

    /// All modes, general first.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::General, Self::Realtime]
    }
}

/// Exchange scope for general searches (`stex_tp`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ExchangeScope {
    /// KOSPI only.
    Kospi,
    /// KOSDAQ only.
    Kosdaq,
    /// All markets.
    #[default]
    All,
}

impl ExchangeScope {
    /// Wire value of `stex_tp`.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Kospi => "K",
            Self::Kosdaq => "Q",
            Self::All => "%",
        }
    }

    /// Parse a scope from its wire code or a market name.
    ///
    /// Unknown values fall back to [`ExchangeScope::All`].
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "K" | "KOSPI" => Self::Kospi,
            "Q" | "KOSDAQ" => Self::Kosdaq,
            _ => Self::All,
        }
    }
}

// =============================================================================
// Condition Match
// =============================================================================

/// One instrument matched by a condition search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionMatch {
    /// Instrument code with the market prefix stripped.
    pub instrument_code: String,
    /// Instrument name.
    pub instrument_name: String,
    /// Last price; `0.0` when the gateway value does not parse.
    pub last_price: f64,
    /// Status code as sent by the gateway (empty when absent).
    pub status: String,
    /// The untouched result row.
    pub raw: Map<String, Value>,
}

impl ConditionMatch {
    /// Build a match from a raw result row.
    #[must_use]
    pub fn from_row(row: Map<String, Value>) -> Self {
        let instrument_code = strip_exchange_prefix(&field_text(&row, FIELD_INSTRUMENT_CODE));
        let instrument_name = field_text(&row, FIELD_INSTRUMENT_NAME).trim().to_string();
        let last_price = parse_price(&field_text(&row, FIELD_LAST_PRICE));
        let status = field_text(&row, FIELD_STATUS);

        Self {
            instrument_code,
            instrument_name,
            last_price,
            status,
            raw: row,
        }
    }

    /// Look up an additional field of the raw row as text.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<String> {
        self.raw.get(key).map(value_text)
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    /// Condition id the page answers.
    pub condition_id: String,
    /// Mode the search ran in.
    pub mode: SearchMode,
    /// Matched instruments, in gateway order.
    pub matches: Vec<ConditionMatch>,
    /// Whether the gateway holds more rows for a continuation request.
    pub more_available: bool,
    /// Continuation cursor for the next page (`next_key`).
    pub next_cursor: Option<String>,
    /// When the page was received.
    pub fetched_at: DateTime<Utc>,
}

impl SearchPage {
    /// Whether the search matched nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Number of matches on this page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    /// Cursor to request the next page, if one exists.
    #[must_use]
    pub fn continuation(&self) -> Option<&str> {
        if self.more_available {
            self.next_cursor.as_deref().filter(|c| !c.is_empty())
        } else {
            None
        }
    }
}

// =============================================================================
// Normalisation
// =============================================================================

/// Remove a single leading ASCII letter market prefix from an instrument code.
///
/// Codes without a prefix are returned trimmed but otherwise unchanged.
#[must_use]
pub fn strip_exchange_prefix(code: &str) -> String {
    let code = code.trim();
    let mut chars = code.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => chars.as_str().to_string(),
        _ => code.to_string(),
    }
}

/// Parse a gateway price string, ignoring a direction sign and thousands
/// separators. Returns `0.0` on failure.
#[must_use]
pub fn parse_price(text: &str) -> f64 {
    let cleaned: String = text.chars().filter(|c| *c != ',').collect();

    cleaned
        .trim()
        .trim_start_matches(['+', '-'])
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map_or(0.0, f64::abs)
}

fn field_text(row: &Map<String, Value>, key: &str) -> String {
    row.get(key).map(value_text).unwrap_or_default()
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
