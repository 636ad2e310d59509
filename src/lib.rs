//! Self-service dashboard backend for a New API gateway: per-user API keys,
//! Ollama channel registration and usage graphs.
//!
//! The binary in `main.rs` only wires configuration, logging and the HTTP
//! listener; everything else lives here so `tests/` can drive it.

use std::sync::Arc;

use anyhow::Context;

pub mod api;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod newapi;
pub mod ollama;
pub mod store;

use config::Config;
use newapi::NewApiClient;
use ollama::OllamaProbe;
use store::{DashboardStore, MemoryStore, PgStore};

/// Shared application state passed to handlers.
pub struct AppState {
    pub gateway: NewApiClient,
    pub store: Arc<dyn DashboardStore>,
    pub ollama: OllamaProbe,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn DashboardStore>) -> anyhow::Result<Self> {
        let gateway = NewApiClient::from_config(&config.new_api)
            .context("failed to build New API client")?;
        let ollama = OllamaProbe::new(ollama::PROBE_TIMEOUT)
            .context("failed to build Ollama probe client")?;
        Ok(Self {
            gateway,
            store,
            ollama,
            config,
        })
    }

    /// Connect the store named by the configuration and build the state.
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn DashboardStore> = match &config.database_url {
            Some(url) => {
                tracing::info!("Connecting to database...");
                let db = PgStore::connect(url).await?;
                tracing::info!("Running migrations...");
                db.migrate().await?;
                Arc::new(db)
            }
            None => {
                tracing::warn!("DATABASE_URL is not set, key and server records are kept in memory");
                Arc::new(MemoryStore::new())
            }
        };
        Self::new(config, store)
    }
}
