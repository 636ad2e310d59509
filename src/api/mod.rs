use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod auth;
pub mod extract;
pub mod keys;
pub mod ollama;
pub mod profile;
pub mod usage;

/// Full application router: health and metrics at the root, dashboard
/// routes under `/api`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readiness_check))
        .route("/metrics", get(metrics))
        .nest("/api", api_router())
        .with_state(state)
}

/// Dashboard routes. Every handler requires a demo user.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/profile", get(profile::get_profile))
        .route("/keys/create", post(keys::create_key))
        .route(
            "/keys/list",
            get(keys::list_keys).delete(keys::delete_key),
        )
        .route("/keys/status", put(keys::update_key_status))
        .route(
            "/ollama/register",
            get(ollama::list_servers)
                .post(ollama::register_server)
                .delete(ollama::delete_server),
        )
        .route("/usage", get(usage::get_usage))
        .layer(TraceLayer::new_for_http())
        .fallback(fallback_404)
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Ready once the gateway accepts our admin credentials.
async fn readiness_check(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    match state.gateway.ensure_authenticated().await {
        Ok(_) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::warn!(error = %e, "readiness: New API login failed");
            (StatusCode::SERVICE_UNAVAILABLE, "gateway unavailable")
        }
    }
}

async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::render(),
    )
}
