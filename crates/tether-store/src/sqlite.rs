use std::time::Duration;

use async_trait::async_trait;
use libsql::{Builder, Connection, Database};
use tether_core::error::{Result, TetherError};
use tether_core::types::now_unix;

use crate::KeyValueStore;

fn map_err(e: libsql::Error) -> TetherError {
    TetherError::Store(e.to_string())
}

/// libsql backend: a local SQLite file or a remote Turso database.
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Open a local libsql database at the given file path.
    pub async fn new(path: &str) -> Result<Self> {
        let db = Builder::new_local(path).build().await.map_err(map_err)?;
        let store = Self { db };
        store.init_tables().await?;
        Ok(store)
    }

    /// Open a remote Turso database.
    pub async fn new_remote(url: &str, token: &str) -> Result<Self> {
        let db = Builder::new_remote(url.to_string(), token.to_string())
            .build()
            .await
            .map_err(map_err)?;
        let store = Self { db };
        store.init_tables().await?;
        Ok(store)
    }

    /// Fresh connection per operation; remote streams expire when held.
    fn conn(&self) -> Result<Connection> {
        self.db.connect().map_err(map_err)
    }

    /// Leaves the row alone if a newer write already replaced it.
    async fn purge_expired(&self, key: &str) -> Result<()> {
        self.conn()?
            .execute(
                "DELETE FROM kv WHERE key = ? AND expires_at IS NOT NULL AND expires_at <= ?",
                libsql::params![key.to_string(), now_unix()],
            )
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn init_tables(&self) -> Result<()> {
        self.conn()?
            .execute(
                "CREATE TABLE IF NOT EXISTS kv (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    expires_at INTEGER
                )",
                (),
            )
            .await
            .map_err(map_err)?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn()?
            .query(
                "SELECT value, expires_at FROM kv WHERE key = ?",
                libsql::params![key.to_string()],
            )
            .await
            .map_err(map_err)?;

        let Some(row) = rows.next().await.map_err(map_err)? else {
            return Ok(None);
        };
        let value = row.get::<String>(0).map_err(map_err)?;
        let expires_at = row.get::<Option<i64>>(1).map_err(map_err)?;

        if expires_at.is_some_and(|exp| now_unix() >= exp) {
            self.purge_expired(key).await?;
            return Ok(None);
        }
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|ttl| now_unix() + ttl.as_secs() as i64);
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO kv (key, value, expires_at) VALUES (?, ?, ?)",
                libsql::params![key.to_string(), value.to_string(), expires_at],
            )
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM kv WHERE key = ?", libsql::params![key.to_string()])
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn()?
            .query(
                "DELETE FROM kv WHERE key = ? RETURNING value, expires_at",
                libsql::params![key.to_string()],
            )
            .await
            .map_err(map_err)?;

        let Some(row) = rows.next().await.map_err(map_err)? else {
            return Ok(None);
        };
        let value = row.get::<String>(0).map_err(map_err)?;
        let expires_at = row.get::<Option<i64>>(1).map_err(map_err)?;

        if expires_at.is_some_and(|exp| now_unix() >= exp) {
            return Ok(None);
        }
        Ok(Some(value))
    }
}
