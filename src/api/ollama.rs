use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::auth::DemoUser;
use super::extract::ApiJson;
use crate::errors::AppError;
use crate::models::records::{NewOllamaServer, OllamaServer};
use crate::newapi::{CreateChannelParams, CHANNEL_TYPE_OLLAMA};
use crate::AppState;

/// Gateway group Ollama channels are filed under.
const OLLAMA_CHANNEL_GROUP: &str = "ollama";

#[derive(Deserialize)]
pub struct RegisterServerRequest {
    pub server_name: Option<String>,
    pub server_url: Option<String>,
}

#[derive(Deserialize)]
pub struct ServerIdParams {
    pub id: Option<Uuid>,
}

/// POST /api/ollama/register — probe a server and register it as a channel
pub async fn register_server(
    State(state): State<Arc<AppState>>,
    user: DemoUser,
    ApiJson(payload): ApiJson<RegisterServerRequest>,
) -> Result<Json<Value>, AppError> {
    let name = payload.server_name.as_deref().map(str::trim).unwrap_or_default();
    let raw_url = payload.server_url.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() || raw_url.is_empty() {
        return Err(AppError::bad_request("Enter a server name and URL."));
    }

    let url = url::Url::parse(raw_url)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .ok_or_else(|| AppError::bad_request("The URL is not valid."))?;
    let server_url = url.as_str().trim_end_matches('/').to_string();

    let models = state.ollama.list_models(&server_url).await.map_err(|e| {
        tracing::warn!(%server_url, error = %e, "Ollama server unreachable");
        AppError::bad_request("Cannot reach the Ollama server. Check the URL.")
    })?;
    if models.is_empty() {
        return Err(AppError::bad_request("No models are installed on the server."));
    }

    let server = register(&state, &user, name, &server_url, models.clone()).await?;
    Ok(Json(json!({ "server": server, "models": models })))
}

/// Create the gateway channel (best effort) and store the registration.
async fn register(
    state: &AppState,
    user: &DemoUser,
    name: &str,
    server_url: &str,
    models: Vec<String>,
) -> Result<OllamaServer, AppError> {
    let channel = CreateChannelParams {
        name: format!("ollama_{}_{}", user.short_id(), name),
        channel_type: CHANNEL_TYPE_OLLAMA,
        key: "ollama".into(),
        base_url: server_url.to_string(),
        models: models.join(","),
        group: Some(OLLAMA_CHANNEL_GROUP.into()),
    };

    let channel_id = match state.gateway.create_channel(channel).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(%server_url, error = %e, "channel creation failed, registering without one");
            None
        }
    };

    let server = state
        .store
        .insert_ollama_server(NewOllamaServer {
            user_id: user.id.clone(),
            server_name: name.to_string(),
            server_url: server_url.to_string(),
            models,
            new_api_channel_id: channel_id,
            last_health_check: Utc::now(),
        })
        .await?;

    tracing::info!(user_id = %user.id, server_id = %server.id, ?channel_id, "Ollama server registered");
    Ok(server)
}

/// GET /api/ollama/register — the user's servers, newest first
pub async fn list_servers(
    State(state): State<Arc<AppState>>,
    user: DemoUser,
) -> Result<Json<Value>, AppError> {
    let servers = state.store.list_ollama_servers(&user.id).await?;
    Ok(Json(json!({ "servers": servers })))
}

/// DELETE /api/ollama/register?id=<uuid>
pub async fn delete_server(
    State(state): State<Arc<AppState>>,
    user: DemoUser,
    Query(params): Query<ServerIdParams>,
) -> Result<Json<Value>, AppError> {
    let id = params
        .id
        .ok_or_else(|| AppError::bad_request("A server id is required."))?;

    if !state.store.delete_ollama_server(&user.id, id).await? {
        return Err(AppError::NotFound("Server not found.".into()));
    }
    Ok(Json(json!({ "success": true })))
}
