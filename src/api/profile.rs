use std::collections::HashSet;
use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};

use super::auth::DemoUser;
use crate::errors::AppError;
use crate::AppState;

/// GET /api/profile — profile of the demo user, with quota used across
/// their keys as the gateway reports it
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    user: DemoUser,
) -> Result<Json<Value>, AppError> {
    let keys = state.store.list_keys(&user.id).await?;
    let used_quota: i64 = if keys.is_empty() {
        0
    } else {
        let owned: HashSet<i64> = keys.iter().map(|k| k.new_api_token_id).collect();
        state
            .gateway
            .list_tokens()
            .await
            .map_err(|e| AppError::upstream("Failed to load the profile.", e))?
            .iter()
            .filter(|t| owned.contains(&t.id))
            .map(|t| t.used_quota)
            .sum()
    };

    Ok(Json(json!({
        "profile": {
            "id": user.id,
            "email": user.email,
            "display_name": user.display_name,
            "max_keys": state.config.max_keys,
            "used_quota": used_quota,
            "total_quota": state.config.default_quota,
            "created_at": Utc::now().to_rfc3339(),
        }
    })))
}
