use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use super::auth::DemoUser;
use crate::errors::AppError;
use crate::models::usage::{aggregate_daily, DailyUsage, Period};
use crate::newapi::{LogFilter, UsageLogEntry};
use crate::AppState;

/// Raw entries returned alongside the daily series.
const RECENT_LOG_LIMIT: usize = 100;

#[derive(Deserialize)]
pub struct UsageParams {
    pub period: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsageResponse {
    /// Most recent entries first.
    pub usage: Vec<UsageLogEntry>,
    #[serde(rename = "dailyUsage")]
    pub daily_usage: Vec<DailyUsage>,
}

/// GET /api/usage?period=day|week|month — usage across the user's keys
pub async fn get_usage(
    State(state): State<Arc<AppState>>,
    user: DemoUser,
    Query(params): Query<UsageParams>,
) -> Result<Json<UsageResponse>, AppError> {
    let keys = state.store.list_keys(&user.id).await?;
    if keys.is_empty() {
        return Ok(Json(UsageResponse {
            usage: Vec::new(),
            daily_usage: Vec::new(),
        }));
    }

    let period = Period::parse(params.period.as_deref());
    let start = period.start_from(Utc::now().timestamp());

    let fetches = keys.iter().map(|key| {
        let token_id = key.new_api_token_id;
        let gateway = &state.gateway;
        async move {
            let result = gateway
                .get_usage_logs(LogFilter::for_token(token_id).since(start))
                .await;
            (token_id, result)
        }
    });

    let mut logs = Vec::new();
    for (token_id, result) in join_all(fetches).await {
        match result {
            Ok(entries) => logs.extend(entries),
            Err(e) => tracing::warn!(token_id, error = %e, "skipping usage logs for token"),
        }
    }

    let daily_usage = aggregate_daily(&logs);
    logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    logs.truncate(RECENT_LOG_LIMIT);

    Ok(Json(UsageResponse {
        usage: logs,
        daily_usage,
    }))
}
