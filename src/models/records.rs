//! Local records. The store keeps only the non-secret side of each key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Characters of the secret kept for display.
const PREVIEW_LEN: usize = 10;

/// Display form of a key secret: first ten characters plus `...`, or
/// `sk-...` when the gateway returned no secret.
pub fn key_preview(secret: &str) -> String {
    if secret.is_empty() {
        return "sk-...".to_string();
    }
    let head: String = secret.chars().take(PREVIEW_LEN).collect();
    format!("{}...", head)
}

/// Mapping from a dashboard user to a gateway token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct KeyRecord {
    pub id: Uuid,
    pub user_id: String,
    pub key_name: String,
    pub new_api_token_id: i64,
    pub key_preview: String,
    pub is_active: bool,
    pub used_quota: i64,
    pub remain_quota: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewKeyRecord {
    pub user_id: String,
    pub key_name: String,
    pub new_api_token_id: i64,
    pub key_preview: String,
    pub remain_quota: i64,
}

impl NewKeyRecord {
    pub fn into_record(self) -> KeyRecord {
        KeyRecord {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            key_name: self.key_name,
            new_api_token_id: self.new_api_token_id,
            key_preview: self.key_preview,
            is_active: true,
            used_quota: 0,
            remain_quota: self.remain_quota,
            created_at: Utc::now(),
        }
    }
}

/// A user's registered Ollama server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OllamaServer {
    pub id: Uuid,
    pub user_id: String,
    pub server_name: String,
    pub server_url: String,
    pub is_active: bool,
    pub last_health_check: Option<DateTime<Utc>>,
    pub models: Vec<String>,
    /// Gateway channel backing this server; null when channel creation failed.
    pub new_api_channel_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOllamaServer {
    pub user_id: String,
    pub server_name: String,
    pub server_url: String,
    pub models: Vec<String>,
    pub new_api_channel_id: Option<i64>,
    pub last_health_check: DateTime<Utc>,
}

impl NewOllamaServer {
    pub fn into_record(self) -> OllamaServer {
        OllamaServer {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            server_name: self.server_name,
            server_url: self.server_url,
            is_active: true,
            last_health_check: Some(self.last_health_check),
            models: self.models,
            new_api_channel_id: self.new_api_channel_id,
            created_at: Utc::now(),
        }
    }
}
