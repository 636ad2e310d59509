//! Local persistence for key mappings and Ollama server registrations.
//!
//! Two backends share [`DashboardStore`]: Postgres for deployments and an
//! in-memory map for demos and tests.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::records::{KeyRecord, NewKeyRecord, NewOllamaServer, OllamaServer};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("store rejected write: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait DashboardStore: Send + Sync {
    // -- Keys --

    async fn count_keys(&self, user_id: &str) -> Result<i64, StoreError>;

    async fn insert_key(&self, key: NewKeyRecord) -> Result<KeyRecord, StoreError>;

    /// Newest first.
    async fn list_keys(&self, user_id: &str) -> Result<Vec<KeyRecord>, StoreError>;

    async fn find_key(&self, user_id: &str, token_id: i64) -> Result<Option<KeyRecord>, StoreError>;

    /// Returns false when the user has no key for `token_id`.
    async fn set_key_active(&self, user_id: &str, token_id: i64, active: bool) -> Result<bool, StoreError>;

    async fn delete_key(&self, user_id: &str, token_id: i64) -> Result<bool, StoreError>;

    // -- Ollama servers --

    async fn insert_ollama_server(&self, server: NewOllamaServer) -> Result<OllamaServer, StoreError>;

    /// Newest first.
    async fn list_ollama_servers(&self, user_id: &str) -> Result<Vec<OllamaServer>, StoreError>;

    async fn delete_ollama_server(&self, user_id: &str, id: Uuid) -> Result<bool, StoreError>;
}
