//! Wire types for the New API admin endpoints.
//!
//! Every endpoint answers with the same envelope (`success`, `message`,
//! `data`). List endpoints disagree between gateway versions on whether
//! `data` is a bare array or an `{items, total}` page; [`normalize_listing`]
//! folds both into one shape so callers never see the difference.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::GatewayError;

/// Quota granted to a new token when the caller does not pick one.
pub const DEFAULT_TOKEN_QUOTA: i64 = 500_000;

/// `expired_time` sentinel for tokens that never expire.
pub const NEVER_EXPIRES: i64 = -1;

/// Channel type tag the gateway uses for Ollama backends.
pub const CHANNEL_TYPE_OLLAMA: i64 = 2;

pub const DEFAULT_CHANNEL_GROUP: &str = "default";

/// Response envelope shared by every admin endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

// ── Tokens ───────────────────────────────────────────────────

/// Token lifecycle state as encoded by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum TokenStatus {
    #[default]
    Enabled,
    Disabled,
    Expired,
    Exhausted,
    Other(i64),
}

impl From<i64> for TokenStatus {
    fn from(code: i64) -> Self {
        match code {
            1 => TokenStatus::Enabled,
            2 => TokenStatus::Disabled,
            3 => TokenStatus::Expired,
            4 => TokenStatus::Exhausted,
            other => TokenStatus::Other(other),
        }
    }
}

impl From<TokenStatus> for i64 {
    fn from(status: TokenStatus) -> Self {
        match status {
            TokenStatus::Enabled => 1,
            TokenStatus::Disabled => 2,
            TokenStatus::Expired => 3,
            TokenStatus::Exhausted => 4,
            TokenStatus::Other(code) => code,
        }
    }
}

impl TokenStatus {
    pub fn is_enabled(self) -> bool {
        self == TokenStatus::Enabled
    }
}

fn never_expires() -> i64 {
    NEVER_EXPIRES
}

/// An API key as the gateway reports it. `key` is only populated in the
/// response to a create call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewApiToken {
    pub id: i64,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: TokenStatus,
    #[serde(default)]
    pub used_quota: i64,
    #[serde(default)]
    pub remain_quota: i64,
    #[serde(default)]
    pub created_time: i64,
    #[serde(default = "never_expires")]
    pub expired_time: i64,
    #[serde(default)]
    pub unlimited_quota: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTokenParams {
    pub name: String,
    pub remain_quota: Option<i64>,
    pub expired_time: Option<i64>,
    pub unlimited_quota: Option<bool>,
}

impl CreateTokenParams {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remain_quota: None,
            expired_time: None,
            unlimited_quota: None,
        }
    }

    pub fn remain_quota(mut self, quota: i64) -> Self {
        self.remain_quota = Some(quota);
        self
    }

    pub fn expired_time(mut self, expires_at: i64) -> Self {
        self.expired_time = Some(expires_at);
        self
    }

    pub fn unlimited_quota(mut self, unlimited: bool) -> Self {
        self.unlimited_quota = Some(unlimited);
        self
    }

    /// Request body with defaults filled in for omitted fields.
    pub fn to_body(&self) -> Value {
        json!({
            "name": self.name,
            "remain_quota": self.remain_quota.unwrap_or(DEFAULT_TOKEN_QUOTA),
            "expired_time": self.expired_time.unwrap_or(NEVER_EXPIRES),
            "unlimited_quota": self.unlimited_quota.unwrap_or(false),
        })
    }
}

/// One page of `GET /api/token/`.
#[derive(Debug, Clone, Default)]
pub struct TokenPage {
    pub items: Vec<NewApiToken>,
    /// Only reported by gateway versions that return `{items, total}`.
    pub total: Option<u64>,
}

// ── Channels ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct CreateChannelParams {
    pub name: String,
    pub channel_type: i64,
    pub key: String,
    pub base_url: String,
    /// Comma-joined model names.
    pub models: String,
    pub group: Option<String>,
}

impl CreateChannelParams {
    pub fn to_body(&self) -> Value {
        let group = self
            .group
            .as_deref()
            .filter(|g| !g.is_empty())
            .unwrap_or(DEFAULT_CHANNEL_GROUP);
        json!({
            "name": self.name,
            "type": self.channel_type,
            "key": self.key,
            "base_url": self.base_url,
            "models": self.models,
            "group": group,
        })
    }
}

// ── Usage logs ───────────────────────────────────────────────

/// A single consumption record from `GET /api/log/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageLogEntry {
    #[serde(default)]
    pub token_id: i64,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub prompt_tokens: i64,
    #[serde(default)]
    pub completion_tokens: i64,
    /// Epoch seconds.
    #[serde(default)]
    pub created_at: i64,
}

/// Optional, additive filters for the usage log query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub token_id: Option<i64>,
    pub start_timestamp: Option<i64>,
    pub end_timestamp: Option<i64>,
}

impl LogFilter {
    pub fn for_token(token_id: i64) -> Self {
        Self {
            token_id: Some(token_id),
            ..Self::default()
        }
    }

    pub fn since(mut self, start: i64) -> Self {
        self.start_timestamp = Some(start);
        self
    }

    pub fn until(mut self, end: i64) -> Self {
        self.end_timestamp = Some(end);
        self
    }

    pub(crate) fn to_query(self) -> String {
        let mut query = String::from("p=0&size=1000");
        if let Some(id) = self.token_id {
            query.push_str(&format!("&token_id={id}"));
        }
        if let Some(start) = self.start_timestamp {
            query.push_str(&format!("&start_timestamp={start}"));
        }
        if let Some(end) = self.end_timestamp {
            query.push_str(&format!("&end_timestamp={end}"));
        }
        query
    }
}

// ── Login ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct LoginUser {
    pub id: i64,
}

// ── Normalization ────────────────────────────────────────────

/// Fold the two list shapes (`data: [..]` and `data: {items, total}`) into
/// `(items, total)`. A missing or null `data` is an empty list.
pub fn normalize_listing<T: DeserializeOwned>(
    data: Option<Value>,
) -> Result<(Vec<T>, Option<u64>), GatewayError> {
    let (items, total) = match data {
        None | Some(Value::Null) => return Ok((Vec::new(), None)),
        Some(items @ Value::Array(_)) => (items, None),
        Some(Value::Object(mut page)) => {
            let total = page.get("total").and_then(Value::as_u64);
            let items = page.remove("items").unwrap_or(Value::Null);
            if items.is_null() {
                return Ok((Vec::new(), total));
            }
            (items, total)
        }
        Some(other) => {
            return Err(GatewayError::Decode(format!(
                "expected a list, got {}",
                short(&other)
            )))
        }
    };

    let items = serde_json::from_value(items)
        .map_err(|e| GatewayError::Decode(format!("invalid list item: {}", e)))?;
    Ok((items, total))
}

fn short(value: &Value) -> String {
    let text = value.to_string();
    text.chars().take(200).collect()
}
