//! Credential persistence keyed by `(provider, user_id, org_id)`.
//!
//! [`CredentialStore`] is the only thing the adapters talk to. It sits on top
//! of a [`KeyValueStore`] backend chosen at startup: Redis, libsql, or an
//! in-process map.

pub mod memory;
pub mod redis;
pub mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tether_core::config::{StoreBackend, StoreConfig};
use tether_core::error::{Result, TetherError};
use tether_core::types::{CredentialKey, Provider, StoredCredential};

pub use crate::memory::MemoryStore;
pub use crate::redis::RedisStore;
pub use crate::sqlite::SqliteStore;

/// Minimal string key-value backend. Each call is atomic for its single key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// Read and remove in one step; at most one caller gets the value.
    async fn take(&self, key: &str) -> Result<Option<String>>;
}

/// Shared handle to the credential backend. Cheap to clone.
#[derive(Clone)]
pub struct CredentialStore {
    kv: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Open the backend named in the config.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let kv: Arc<dyn KeyValueStore> = match config.backend {
            StoreBackend::Redis => Arc::new(RedisStore::connect(&config.redis_url).await?),
            StoreBackend::Libsql if !config.turso_url.is_empty() => {
                Arc::new(SqliteStore::new_remote(&config.turso_url, &config.turso_token).await?)
            }
            StoreBackend::Libsql => Arc::new(SqliteStore::new(&config.path).await?),
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
        };
        tracing::info!(backend = ?config.backend, "credential store ready");
        Ok(Self::new(kv))
    }

    /// Upsert the credential for one connected account. Last write wins.
    pub async fn put(
        &self,
        provider: Provider,
        user_id: &str,
        org_id: &str,
        credential: &StoredCredential,
    ) -> Result<()> {
        let key = CredentialKey::new(provider, user_id, org_id);
        let value = serde_json::to_string(credential)
            .map_err(|e| TetherError::Store(format!("credential encode failed: {e}")))?;
        self.kv.set(key.as_str(), &value, None).await
    }

    /// Stored credential, or `None` when the account was never connected.
    pub async fn find(
        &self,
        provider: Provider,
        user_id: &str,
        org_id: &str,
    ) -> Result<Option<StoredCredential>> {
        let key = CredentialKey::new(provider, user_id, org_id);
        let Some(value) = self.kv.get(key.as_str()).await? else {
            return Ok(None);
        };
        let credential = serde_json::from_str(&value)
            .map_err(|e| TetherError::Store(format!("corrupt credential at {key}: {e}")))?;
        Ok(Some(credential))
    }

    /// Stored credential, or the `{"access_token": "not-found"}` placeholder.
    pub async fn get(
        &self,
        provider: Provider,
        user_id: &str,
        org_id: &str,
    ) -> Result<StoredCredential> {
        Ok(self
            .find(provider, user_id, org_id)
            .await?
            .unwrap_or_else(StoredCredential::not_found))
    }

    /// Keep a short-lived value between the authorize and callback steps.
    pub async fn stash(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.kv.set(key, value, Some(ttl)).await
    }

    /// Read and remove a stashed value. Concurrent callers never both get it.
    pub async fn take(&self, key: &str) -> Result<Option<String>> {
        self.kv.take(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_core::types::AuthorizationState;

    fn credential(token: &str) -> StoredCredential {
        let state = AuthorizationState::new("u1", "o1").unwrap();
        StoredCredential::from_token_response(json!({"access_token": token}), &state).unwrap()
    }

    #[tokio::test]
    async fn test_get_missing_returns_placeholder() {
        let store = CredentialStore::in_memory();
        assert!(store.find(Provider::HubSpot, "u1", "o1").await.unwrap().is_none());

        let cred = store.get(Provider::HubSpot, "u1", "o1").await.unwrap();
        assert_eq!(cred.into_value(), json!({"access_token": "not-found"}));
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = CredentialStore::in_memory();
        let cred = credential("tok123");
        store.put(Provider::HubSpot, "u1", "o1", &cred).await.unwrap();

        assert_eq!(store.get(Provider::HubSpot, "u1", "o1").await.unwrap(), cred);
        // Other providers and identities are separate keys
        assert!(store.get(Provider::Notion, "u1", "o1").await.unwrap().is_not_found());
        assert!(store.get(Provider::HubSpot, "u1", "o2").await.unwrap().is_not_found());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = CredentialStore::in_memory();
        store
            .put(Provider::Airtable, "u1", "o1", &credential("first"))
            .await
            .unwrap();
        store
            .put(Provider::Airtable, "u1", "o1", &credential("second"))
            .await
            .unwrap();

        let cred = store.get(Provider::Airtable, "u1", "o1").await.unwrap();
        assert_eq!(cred.access_token(), Some("second"));
    }

    #[tokio::test]
    async fn test_repeated_get_is_stable() {
        let store = CredentialStore::in_memory();
        store
            .put(Provider::HubSpot, "u1", "o1", &credential("tok"))
            .await
            .unwrap();

        let first = store.get(Provider::HubSpot, "u1", "o1").await.unwrap();
        let second = store.get(Provider::HubSpot, "u1", "o1").await.unwrap();
        assert_eq!(first, second);

        let first = store.get(Provider::Notion, "u9", "o9").await.unwrap();
        let second = store.get(Provider::Notion, "u9", "o9").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_corrupt_document_is_store_error() {
        let kv = Arc::new(MemoryStore::new());
        kv.set("hubspot:u1:o1", "not json", None).await.unwrap();
        let store = CredentialStore::new(kv);

        assert!(matches!(
            store.get(Provider::HubSpot, "u1", "o1").await,
            Err(TetherError::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_take_consumes_value() {
        let store = CredentialStore::in_memory();
        store
            .stash("airtable_verifier:u1:o1", "v", Duration::from_secs(600))
            .await
            .unwrap();

        assert_eq!(
            store.take("airtable_verifier:u1:o1").await.unwrap().as_deref(),
            Some("v")
        );
        assert!(store.take("airtable_verifier:u1:o1").await.unwrap().is_none());
    }
}
