use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{DashboardStore, StoreError};
use crate::models::records::{KeyRecord, NewKeyRecord, NewOllamaServer, OllamaServer};

const KEY_COLUMNS: &str = "id, user_id, key_name, new_api_token_id, key_preview, is_active, \
                           used_quota, remain_quota, created_at";

const SERVER_COLUMNS: &str = "id, user_id, server_name, server_url, is_active, last_health_check, \
                              models, new_api_channel_id, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl DashboardStore for PgStore {
    // -- Key Operations --

    async fn count_keys(&self, user_id: &str) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM user_api_keys WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn insert_key(&self, key: NewKeyRecord) -> Result<KeyRecord, StoreError> {
        let record = key.into_record();
        let row = sqlx::query_as::<_, KeyRecord>(&format!(
            "INSERT INTO user_api_keys ({KEY_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {KEY_COLUMNS}"
        ))
        .bind(record.id)
        .bind(&record.user_id)
        .bind(&record.key_name)
        .bind(record.new_api_token_id)
        .bind(&record.key_preview)
        .bind(record.is_active)
        .bind(record.used_quota)
        .bind(record.remain_quota)
        .bind(record.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_keys(&self, user_id: &str) -> Result<Vec<KeyRecord>, StoreError> {
        let rows = sqlx::query_as::<_, KeyRecord>(&format!(
            "SELECT {KEY_COLUMNS} FROM user_api_keys WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_key(&self, user_id: &str, token_id: i64) -> Result<Option<KeyRecord>, StoreError> {
        let row = sqlx::query_as::<_, KeyRecord>(&format!(
            "SELECT {KEY_COLUMNS} FROM user_api_keys WHERE user_id = $1 AND new_api_token_id = $2"
        ))
        .bind(user_id)
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn set_key_active(&self, user_id: &str, token_id: i64, active: bool) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE user_api_keys SET is_active = $3 WHERE user_id = $1 AND new_api_token_id = $2",
        )
        .bind(user_id)
        .bind(token_id)
        .bind(active)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_key(&self, user_id: &str, token_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM user_api_keys WHERE user_id = $1 AND new_api_token_id = $2",
        )
        .bind(user_id)
        .bind(token_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // -- Ollama Server Operations --

    async fn insert_ollama_server(&self, server: NewOllamaServer) -> Result<OllamaServer, StoreError> {
        let record = server.into_record();
        let row = sqlx::query_as::<_, OllamaServer>(&format!(
            "INSERT INTO user_ollama_servers ({SERVER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {SERVER_COLUMNS}"
        ))
        .bind(record.id)
        .bind(&record.user_id)
        .bind(&record.server_name)
        .bind(&record.server_url)
        .bind(record.is_active)
        .bind(record.last_health_check)
        .bind(&record.models)
        .bind(record.new_api_channel_id)
        .bind(record.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_ollama_servers(&self, user_id: &str) -> Result<Vec<OllamaServer>, StoreError> {
        let rows = sqlx::query_as::<_, OllamaServer>(&format!(
            "SELECT {SERVER_COLUMNS} FROM user_ollama_servers WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_ollama_server(&self, user_id: &str, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM user_ollama_servers WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
