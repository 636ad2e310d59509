use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::{DashboardStore, StoreError};
use crate::models::records::{KeyRecord, NewKeyRecord, NewOllamaServer, OllamaServer};

/// Process-local store. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    keys: DashMap<Uuid, KeyRecord>,
    servers: DashMap<Uuid, OllamaServer>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key_id(&self, user_id: &str, token_id: i64) -> Option<Uuid> {
        self.keys
            .iter()
            .find(|k| k.user_id == user_id && k.new_api_token_id == token_id)
            .map(|k| k.id)
    }
}

#[async_trait]
impl DashboardStore for MemoryStore {
    async fn count_keys(&self, user_id: &str) -> Result<i64, StoreError> {
        Ok(self.keys.iter().filter(|k| k.user_id == user_id).count() as i64)
    }

    async fn insert_key(&self, key: NewKeyRecord) -> Result<KeyRecord, StoreError> {
        if self.key_id(&key.user_id, key.new_api_token_id).is_some() {
            return Err(StoreError::Rejected(format!(
                "token {} is already mapped",
                key.new_api_token_id
            )));
        }
        let record = key.into_record();
        self.keys.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list_keys(&self, user_id: &str) -> Result<Vec<KeyRecord>, StoreError> {
        let mut keys: Vec<KeyRecord> = self
            .keys
            .iter()
            .filter(|k| k.user_id == user_id)
            .map(|k| k.value().clone())
            .collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(keys)
    }

    async fn find_key(&self, user_id: &str, token_id: i64) -> Result<Option<KeyRecord>, StoreError> {
        Ok(self
            .key_id(user_id, token_id)
            .and_then(|id| self.keys.get(&id).map(|k| k.value().clone())))
    }

    async fn set_key_active(&self, user_id: &str, token_id: i64, active: bool) -> Result<bool, StoreError> {
        let Some(id) = self.key_id(user_id, token_id) else {
            return Ok(false);
        };
        Ok(match self.keys.get_mut(&id) {
            Some(mut key) => {
                key.is_active = active;
                true
            }
            None => false,
        })
    }

    async fn delete_key(&self, user_id: &str, token_id: i64) -> Result<bool, StoreError> {
        Ok(self
            .key_id(user_id, token_id)
            .and_then(|id| self.keys.remove(&id))
            .is_some())
    }

    async fn insert_ollama_server(&self, server: NewOllamaServer) -> Result<OllamaServer, StoreError> {
        let record = server.into_record();
        self.servers.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list_ollama_servers(&self, user_id: &str) -> Result<Vec<OllamaServer>, StoreError> {
        let mut servers: Vec<OllamaServer> = self
            .servers
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.value().clone())
            .collect();
        servers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(servers)
    }

    async fn delete_ollama_server(&self, user_id: &str, id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .servers
            .remove_if(&id, |_, s| s.user_id == user_id)
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn new_key(user: &str, token_id: i64) -> NewKeyRecord {
        NewKeyRecord {
            user_id: user.into(),
            key_name: format!("key-{token_id}"),
            new_api_token_id: token_id,
            key_preview: "sk-abc...".into(),
            remain_quota: 500_000,
        }
    }

    #[tokio::test]
    async fn test_keys_are_scoped_per_user() {
        let store = MemoryStore::new();
        store.insert_key(new_key("alice", 1)).await.unwrap();
        store.insert_key(new_key("alice", 2)).await.unwrap();
        store.insert_key(new_key("bob", 3)).await.unwrap();

        assert_eq!(store.count_keys("alice").await.unwrap(), 2);
        assert_eq!(store.count_keys("bob").await.unwrap(), 1);
        assert!(store.find_key("bob", 1).await.unwrap().is_none());
        assert!(!store.delete_key("bob", 1).await.unwrap());
        assert!(store.delete_key("alice", 1).await.unwrap());
        assert_eq!(store.count_keys("alice").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_token_mapping_rejected() {
        let store = MemoryStore::new();
        store.insert_key(new_key("alice", 1)).await.unwrap();
        let err = store.insert_key(new_key("alice", 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_toggle_key_active() {
        let store = MemoryStore::new();
        store.insert_key(new_key("alice", 1)).await.unwrap();
        assert!(store.set_key_active("alice", 1, false).await.unwrap());
        assert!(!store.find_key("alice", 1).await.unwrap().unwrap().is_active);
        assert!(!store.set_key_active("alice", 99, false).await.unwrap());
    }

    #[tokio::test]
    async fn test_servers_delete_checks_owner() {
        let store = MemoryStore::new();
        let server = store
            .insert_ollama_server(NewOllamaServer {
                user_id: "alice".into(),
                server_name: "home".into(),
                server_url: "http://10.0.0.2:11434".into(),
                models: vec!["llama3".into()],
                new_api_channel_id: None,
                last_health_check: Utc::now(),
            })
            .await
            .unwrap();

        assert!(!store.delete_ollama_server("bob", server.id).await.unwrap());
        assert_eq!(store.list_ollama_servers("alice").await.unwrap().len(), 1);
        assert!(store.delete_ollama_server("alice", server.id).await.unwrap());
        assert!(store.list_ollama_servers("alice").await.unwrap().is_empty());
    }
}
