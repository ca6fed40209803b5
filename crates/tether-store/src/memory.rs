use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tether_core::error::Result;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::KeyValueStore;

#[derive(Clone, Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() >= exp)
    }
}

/// In-process backend. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Drop `key` only if it is still expired; a concurrent `set` may have
/// replaced it since the caller last looked.
fn remove_if_expired(entries: &mut HashMap<String, Entry>, key: &str) {
    if entries.get(key).is_some_and(Entry::is_expired) {
        entries.remove(key);
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                drop(entries);
                remove_if_expired(&mut *self.entries.write().await, key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>> {
        let entry = self.entries.write().await.remove(key);
        Ok(entry.filter(|e| !e.is_expired()).map(|e| e.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        assert!(store.get("k").await.unwrap().is_none());

        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        store.delete("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let store = MemoryStore::new();
        store
            .set("k", "v", Some(Duration::from_secs(600)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(599)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_cleanup_keeps_fresh_value() {
        let store = MemoryStore::new();
        store
            .set("k", "old", Some(Duration::from_secs(1)))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        // A fresh write landed between the read and the cleanup
        store
            .set("k", "new", Some(Duration::from_secs(600)))
            .await
            .unwrap();
        remove_if_expired(&mut *store.entries.write().await, "k");
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("new"));

        tokio::time::advance(Duration::from_secs(601)).await;
        remove_if_expired(&mut *store.entries.write().await, "k");
        assert!(store.entries.read().await.get("k").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_is_single_use() {
        let store = Arc::new(MemoryStore::new());
        store.set("k", "v", Some(Duration::from_secs(600))).await.unwrap();

        let (a, b) = tokio::join!(store.take("k"), store.take("k"));
        let taken: Vec<String> = [a.unwrap(), b.unwrap()].into_iter().flatten().collect();
        assert_eq!(taken, vec!["v".to_string()]);

        store.set("k", "v", Some(Duration::from_secs(1))).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.take("k").await.unwrap().is_none());
    }
}
