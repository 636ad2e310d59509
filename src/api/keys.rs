use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::auth::DemoUser;
use super::extract::ApiJson;
use crate::errors::AppError;
use crate::models::records::{key_preview, KeyRecord, NewKeyRecord};
use crate::newapi::{CreateTokenParams, NewApiToken, TokenStatus};
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize)]
pub struct CreateKeyRequest {
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateKeyResponse {
    /// The full secret. Returned exactly once, never stored.
    pub key: String,
    pub key_name: String,
    pub key_preview: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeyView {
    pub id: i64,
    pub key_name: String,
    pub key_preview: String,
    pub new_api_token_id: i64,
    pub remain_quota: i64,
    pub used_quota: i64,
    /// "active" | "disabled"
    pub status: String,
    pub created_at: String,
}

impl KeyView {
    fn from_token(token: &NewApiToken, record: &KeyRecord) -> Self {
        let created_at = DateTime::<Utc>::from_timestamp(token.created_time, 0)
            .unwrap_or(record.created_at);
        Self {
            id: token.id,
            key_name: record.key_name.clone(),
            key_preview: record.key_preview.clone(),
            new_api_token_id: token.id,
            remain_quota: token.remain_quota,
            used_quota: token.used_quota,
            status: if token.status.is_enabled() {
                "active".into()
            } else {
                "disabled".into()
            },
            created_at: created_at.to_rfc3339(),
        }
    }
}

#[derive(Deserialize)]
pub struct KeyIdParams {
    pub id: Option<i64>,
}

#[derive(Deserialize)]
pub struct UpdateKeyStatusRequest {
    pub id: i64,
    pub enabled: bool,
}

// ── Handlers ─────────────────────────────────────────────────

/// POST /api/keys/create — mint a gateway token for the user
pub async fn create_key(
    State(state): State<Arc<AppState>>,
    user: DemoUser,
    ApiJson(payload): ApiJson<CreateKeyRequest>,
) -> Result<Json<CreateKeyResponse>, AppError> {
    let name = payload.name.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(AppError::bad_request("Enter a key name."));
    }

    let max_keys = state.config.max_keys;
    let mut existing = state.store.count_keys(&user.id).await?;
    if existing >= max_keys {
        existing = prune_stale_keys(&state, &user).await?;
    }
    if existing >= max_keys {
        return Err(AppError::bad_request(format!(
            "You can create at most {} keys.",
            max_keys
        )));
    }

    let quota = state.config.default_quota;
    let token = state
        .gateway
        .create_token(
            CreateTokenParams::new(format!("{}_{}", user.short_id(), name)).remain_quota(quota),
        )
        .await
        .map_err(|e| AppError::upstream("Failed to create the key.", e))?;

    let preview = key_preview(&token.key);
    let record = NewKeyRecord {
        user_id: user.id.clone(),
        key_name: name.to_string(),
        new_api_token_id: token.id,
        key_preview: preview.clone(),
        remain_quota: quota,
    };

    if let Err(e) = state.store.insert_key(record).await {
        tracing::error!(token_id = token.id, error = %e, "failed to store key mapping, rolling back");
        // Best effort: the upstream token is orphaned if this fails too.
        if let Err(cleanup) = state.gateway.delete_token(token.id).await {
            tracing::warn!(token_id = token.id, error = %cleanup, "rollback of gateway token failed");
        }
        return Err(AppError::Internal("Failed to save the key.".into()));
    }

    tracing::info!(user_id = %user.id, token_id = token.id, "key created");
    Ok(Json(CreateKeyResponse {
        key: token.key,
        key_name: name.to_string(),
        key_preview: preview,
    }))
}

/// GET /api/keys/list — the user's keys with live quota from the gateway
pub async fn list_keys(
    State(state): State<Arc<AppState>>,
    user: DemoUser,
) -> Result<Json<Value>, AppError> {
    let records = state.store.list_keys(&user.id).await?;
    if records.is_empty() {
        return Ok(Json(json!({ "keys": [] })));
    }

    let tokens = state
        .gateway
        .list_tokens()
        .await
        .map_err(|e| AppError::upstream("Failed to load keys.", e))?;

    let by_token: HashMap<i64, &KeyRecord> = records
        .iter()
        .map(|r| (r.new_api_token_id, r))
        .collect();
    let keys: Vec<KeyView> = tokens
        .iter()
        .filter_map(|t| by_token.get(&t.id).map(|r| KeyView::from_token(t, r)))
        .collect();

    Ok(Json(json!({ "keys": keys })))
}

/// DELETE /api/keys/list?id=<token id> — revoke a key
pub async fn delete_key(
    State(state): State<Arc<AppState>>,
    user: DemoUser,
    Query(params): Query<KeyIdParams>,
) -> Result<Json<Value>, AppError> {
    let token_id = params
        .id
        .ok_or_else(|| AppError::bad_request("A key id is required."))?;

    if state.store.find_key(&user.id, token_id).await?.is_none() {
        return Err(AppError::NotFound("Key not found.".into()));
    }

    state
        .gateway
        .delete_token(token_id)
        .await
        .map_err(|e| AppError::upstream("Failed to delete the key.", e))?;
    // The token is gone upstream; a leftover record is pruned at the key limit.
    if let Err(e) = state.store.delete_key(&user.id, token_id).await {
        tracing::warn!(user_id = %user.id, token_id, error = %e, "failed to drop local key record");
    }

    Ok(Json(json!({ "success": true })))
}

/// PUT /api/keys/status — enable or disable a key
pub async fn update_key_status(
    State(state): State<Arc<AppState>>,
    user: DemoUser,
    ApiJson(payload): ApiJson<UpdateKeyStatusRequest>,
) -> Result<Json<Value>, AppError> {
    if state.store.find_key(&user.id, payload.id).await?.is_none() {
        return Err(AppError::NotFound("Key not found.".into()));
    }

    let status = if payload.enabled {
        TokenStatus::Enabled
    } else {
        TokenStatus::Disabled
    };
    state
        .gateway
        .update_token_status(payload.id, status)
        .await
        .map_err(|e| AppError::upstream("Failed to update the key.", e))?;
    state
        .store
        .set_key_active(&user.id, payload.id, payload.enabled)
        .await?;

    Ok(Json(json!({ "success": true })))
}

/// Drop the user's records whose gateway token no longer exists. Returns the
/// number of records left.
async fn prune_stale_keys(state: &AppState, user: &DemoUser) -> Result<i64, AppError> {
    let records = state.store.list_keys(&user.id).await?;
    let live: HashSet<i64> = state
        .gateway
        .list_tokens()
        .await
        .map_err(|e| AppError::upstream("Failed to load keys.", e))?
        .into_iter()
        .map(|t| t.id)
        .collect();

    let mut remaining = 0;
    for record in records {
        if live.contains(&record.new_api_token_id) {
            remaining += 1;
            continue;
        }
        tracing::info!(user_id = %user.id, token_id = record.new_api_token_id, "pruning stale key record");
        state
            .store
            .delete_key(&user.id, record.new_api_token_id)
            .await?;
    }
    Ok(remaining)
}
