//! Kiwoom WebSocket Message Types
//!
//! Wire format types for the gateway's condition-search protocol. Every
//! frame is a JSON object whose `trnm` field names the message type.
//!
//! # Message Types
//!
//! ## Outbound
//! - `LOGIN`: `{"trnm":"LOGIN","token":"..."}`
//! - `CNSRLST`: `{"trnm":"CNSRLST"}`
//! - `CNSRREQ` general: `{"trnm":"CNSRREQ","seq":"3","search_type":"0","stex_tp":"K","cont_yn":"N","next_key":""}`
//! - `CNSRREQ` realtime: `{"trnm":"CNSRREQ","seq":"3","search_type":"1"}`
//! - `CNSRCLR`: `{"trnm":"CNSRCLR","seq":"3"}`
//!
//! ## Inbound
//! - `LOGIN` ack with `return_code` / `return_msg`
//! - `PING` keepalive (echoed verbatim)
//! - `CNSRLST` with `data: [[id, name], ...]`
//! - `CNSRREQ` with `seq`, `cont_yn`, `next_key`, `data: [{field: value}, ...]`
//! - `CNSRCLR` ack

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::domain::condition::{
    ConditionDefinition, ConditionMatch, ExchangeScope, SearchMode, SearchPage,
};

// =============================================================================
// Message Kind
// =============================================================================

/// Message type discriminator (the `trnm` field).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Login request / acknowledgement.
    Login,
    /// Keepalive.
    Ping,
    /// Condition list query / response.
    ConditionList,
    /// Condition search request / response.
    ConditionSearch,
    /// Stop realtime condition request / acknowledgement.
    ConditionClear,
    /// Any other message type, kept verbatim.
    Other(String),
}

impl MessageKind {
    /// Wire value of `trnm`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Login => "LOGIN",
            Self::Ping => "PING",
            Self::ConditionList => "CNSRLST",
            Self::ConditionSearch => "CNSRREQ",
            Self::ConditionClear => "CNSRCLR",
            Self::Other(name) => name,
        }
    }

    /// Parse a `trnm` value.
    #[must_use]
    pub fn from_trnm(trnm: &str) -> Self {
        match trnm {
            "LOGIN" => Self::Login,
            "PING" => Self::Ping,
            "CNSRLST" => Self::ConditionList,
            "CNSRREQ" => Self::ConditionSearch,
            "CNSRCLR" => Self::ConditionClear,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Outbound Requests
// =============================================================================

/// Login request; must be the first frame on a connection.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct LoginRequest {
    /// Always `LOGIN`.
    pub trnm: &'static str,
    /// Bearer access token.
    pub token: String,
}

impl LoginRequest {
    /// Create a login request.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            trnm: "LOGIN",
            token: token.into(),
        }
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("trnm", &self.trnm)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Condition list query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionListRequest {
    /// Always `CNSRLST`.
    pub trnm: &'static str,
}

impl Default for ConditionListRequest {
    fn default() -> Self {
        Self { trnm: "CNSRLST" }
    }
}

/// Condition search request.
///
/// General searches carry `stex_tp`, `cont_yn` and `next_key`; realtime
/// searches must omit all three, so they are skipped when `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionSearchRequest {
    /// Always `CNSRREQ`.
    pub trnm: &'static str,
    /// Condition id.
    pub seq: String,
    /// `"0"` general, `"1"` realtime.
    pub search_type: &'static str,
    /// Exchange scope (general only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stex_tp: Option<&'static str>,
    /// Continuation flag (general only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cont_yn: Option<&'static str>,
    /// Continuation cursor (general only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_key: Option<String>,
}

impl ConditionSearchRequest {
    /// General search over `scope`, optionally continuing from `cursor`.
    #[must_use]
    pub fn general(
        condition_id: impl Into<String>,
        scope: ExchangeScope,
        cursor: Option<&str>,
    ) -> Self {
        let cursor = cursor.filter(|c| !c.is_empty());
        Self {
            trnm: "CNSRREQ",
            seq: condition_id.into(),
            search_type: SearchMode::General.search_type(),
            stex_tp: Some(scope.code()),
            cont_yn: Some(if cursor.is_some() { "Y" } else { "N" }),
            next_key: Some(cursor.unwrap_or_default().to_string()),
        }
    }

    /// Realtime search.
    #[must_use]
    pub fn realtime(condition_id: impl Into<String>) -> Self {
        Self {
            trnm: "CNSRREQ",
            seq: condition_id.into(),
            search_type: SearchMode::Realtime.search_type(),
            stex_tp: None,
            cont_yn: None,
            next_key: None,
        }
    }

    /// Build the request shape for `mode`. Scope and cursor are ignored for
    /// realtime searches.
    #[must_use]
    pub fn for_mode(
        condition_id: impl Into<String>,
        mode: SearchMode,
        scope: ExchangeScope,
        cursor: Option<&str>,
    ) -> Self {
        match mode {
            SearchMode::General => Self::general(condition_id, scope, cursor),
            SearchMode::Realtime => Self::realtime(condition_id),
        }
    }
}

/// Stop-realtime request for a condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionClearRequest {
    /// Always `CNSRCLR`.
    pub trnm: &'static str,
    /// Condition id.
    pub seq: String,
}

impl ConditionClearRequest {
    /// Create a clear request.
    #[must_use]
    pub fn new(condition_id: impl Into<String>) -> Self {
        Self {
            trnm: "CNSRCLR",
            seq: condition_id.into(),
        }
    }
}

// =============================================================================
// Inbound Responses
// =============================================================================

/// Return status shared by every acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReturnStatus {
    /// `0` on success. Missing codes are treated as failures.
    #[serde(default = "missing_return_code", deserialize_with = "lenient_i64")]
    pub return_code: i64,
    /// Human readable status.
    #[serde(default)]
    pub return_msg: String,
}

impl ReturnStatus {
    /// Whether the gateway reported success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.return_code == 0
    }
}

/// Login acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginAck {
    /// Return status.
    #[serde(flatten)]
    pub status: ReturnStatus,
}

/// Condition list response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConditionListResponse {
    /// Return status.
    #[serde(flatten)]
    pub status: ReturnStatus,
    /// Rows of `[id, name, ...]`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<Value>,
}

impl ConditionListResponse {
    /// Convert rows into condition definitions, preserving order.
    ///
    /// Rows without at least an id and a name are skipped.
    #[must_use]
    pub fn conditions(&self) -> Vec<ConditionDefinition> {
        self.data
            .iter()
            .filter_map(|row| {
                let cells = row.as_array()?;
                let id = cell_text(cells.first()?)?;
                let name = cell_text(cells.get(1)?)?;
                Some(ConditionDefinition::new(id, name))
            })
            .collect()
    }
}

/// Condition search response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConditionSearchResponse {
    /// Condition id the response answers.
    #[serde(default, deserialize_with = "lenient_string")]
    pub seq: String,
    /// Return status.
    #[serde(flatten)]
    pub status: ReturnStatus,
    /// `"Y"` when more rows are available.
    #[serde(default, deserialize_with = "null_as_default")]
    pub cont_yn: String,
    /// Continuation cursor.
    #[serde(default, deserialize_with = "null_as_default")]
    pub next_key: String,
    /// Result rows.
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<Map<String, Value>>,
}

impl ConditionSearchResponse {
    /// Whether the gateway holds more rows.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.cont_yn.eq_ignore_ascii_case("Y")
    }

    /// Convert into a result page, one match per row in gateway order.
    #[must_use]
    pub fn into_page(self, condition_id: impl Into<String>, mode: SearchMode) -> SearchPage {
        let more_available = self.has_more();
        let next_cursor = Some(self.next_key).filter(|key| !key.is_empty());
        SearchPage {
            condition_id: condition_id.into(),
            mode,
            matches: self.data.into_iter().map(ConditionMatch::from_row).collect(),
            more_available,
            next_cursor,
            fetched_at: Utc::now(),
        }
    }
}

/// Generic acknowledgement (`CNSRCLR` and friends).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Acknowledgement {
    /// Return status.
    #[serde(flatten)]
    pub status: ReturnStatus,
}

// =============================================================================
// Lenient Field Helpers
// =============================================================================

const fn missing_return_code() -> i64 {
    -1
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read a correlation key (`seq`) from a raw frame, accepting strings and numbers.
#[must_use]
pub fn correlation_key(body: &Map<String, Value>) -> Option<String> {
    body.get("seq")
        .and_then(cell_text)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match &value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom(format!("return code out of range: {n}"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("non-numeric return code: {s}"))),
        Value::Null => Ok(missing_return_code()),
        other => Err(serde::de::Error::custom(format!(
            "unexpected return code: {other}"
        ))),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(cell_text(&value).unwrap_or_default())
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
