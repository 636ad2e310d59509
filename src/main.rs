use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderName, HeaderValue, Method};
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dashboard::{api, config, AppState};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    init_tracing(args.log_json)?;

    let cfg = config::load()?;

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        tracing::error!("Error: {:?}", e);
    }
    result
}

/// Logging goes to stdout; spans are exported over OTLP as well when
/// OTEL_EXPORTER_OTLP_ENDPOINT is set.
fn init_tracing(json: bool) -> anyhow::Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "newapi-dashboard"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "dashboard=debug,tower_http=debug".into()),
    );

    let (plain, json_fmt) = if json {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer()), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json_fmt)
        .with(telemetry_layer)
        .init();
    Ok(())
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    tracing::info!(
        base_url = %cfg.new_api.base_url,
        auth = ?cfg.new_api.auth,
        "Using New API gateway"
    );

    let dashboard_origin = cfg.dashboard_origin.clone();
    let state = Arc::new(AppState::connect(cfg).await?);

    let app = api::router(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(cors_layer(dashboard_origin))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(axum::middleware::from_fn(security_headers_middleware));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Dashboard API listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    opentelemetry::global::shutdown_tracer_provider();
    Ok(())
}

/// The dashboard authenticates with cookies, so credentials are allowed and
/// origins are pinned to the dashboard plus local dev hosts.
fn cors_layer(dashboard_origin: String) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            let origin_str = origin.to_str().unwrap_or("");
            origin_str == dashboard_origin
                || origin_str.starts_with("http://localhost:")
                || origin_str.starts_with("http://127.0.0.1:")
        }))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("x-request-id"),
        ])
        .allow_credentials(true)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

/// Middleware: injects a unique X-Request-Id into every response.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

/// Middleware: security headers on every response. Key secrets travel in
/// response bodies, so nothing may be cached.
async fn security_headers_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("Cache-Control", HeaderValue::from_static("no-store"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
    headers.remove("Server");

    resp
}
