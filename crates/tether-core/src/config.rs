use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, TetherError};
use crate::types::Provider;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub hubspot: ProviderConfig,
    #[serde(default)]
    pub airtable: ProviderConfig,
    #[serde(default)]
    pub notion: ProviderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally reachable base URL, used to derive default redirect URIs.
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// Where the browser is sent after a successful callback.
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Timeout applied to every outbound provider request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_public_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec![default_frontend_url()]
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
            frontend_url: default_frontend_url(),
            allowed_origins: default_allowed_origins(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Redis,
    Libsql,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default)]
    pub turso_url: String,
    #[serde(default)]
    pub turso_token: String,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_db_path() -> String {
    "tether.db".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: default_redis_url(),
            path: default_db_path(),
            turso_url: String::new(),
            turso_token: String::new(),
        }
    }
}

/// OAuth client registration for one provider.
///
/// Endpoint overrides are `None` in production; tests point them at a mock server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub api_base: Option<String>,
}

impl ProviderConfig {
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty()
    }
}

impl Config {
    /// Load config: defaults → tether.toml → env vars (env wins).
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| TetherError::Config(format!("failed to read config: {e}")))?;
            Self::from_toml(&content)?
        } else {
            Self::default()
        };

        Ok(config.with_env(|key| std::env::var(key).ok()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| TetherError::Config(format!("failed to parse config: {e}")))
    }

    /// Apply overrides from `lookup`, then fill in derived defaults.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TETHER_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = v;
        }
        if let Some(v) = lookup("TETHER_PUBLIC_URL") {
            self.server.public_url = v;
        }
        if let Some(v) = lookup("TETHER_FRONTEND_URL") {
            self.server.frontend_url = v;
        }
        if let Some(v) = lookup("REDIS_URL") {
            self.store.redis_url = v;
        }
        if let Some(v) = lookup("TETHER_TURSO_URL") {
            self.store.turso_url = v;
        }
        if let Some(v) = lookup("TETHER_TURSO_TOKEN") {
            self.store.turso_token = v;
        }

        for provider in Provider::ALL {
            let prefix = provider.as_str().to_ascii_uppercase();
            let public_url = self.server.public_url.trim_end_matches('/').to_string();
            let section = self.provider_mut(provider);

            if let Some(v) = lookup(&format!("{prefix}_CLIENT_ID")) {
                section.client_id = v;
            }
            if let Some(v) = lookup(&format!("{prefix}_CLIENT_SECRET")) {
                section.client_secret = v;
            }
            if let Some(v) = lookup(&format!("{prefix}_REDIRECT_URI")) {
                section.redirect_uri = v;
            }

            // Fallback: callback route served by this process
            if section.redirect_uri.is_empty() {
                section.redirect_uri = format!(
                    "{public_url}/integrations/{}/oauth2callback",
                    provider.as_str()
                );
            }
        }

        self
    }

    pub fn provider(&self, provider: Provider) -> &ProviderConfig {
        match provider {
            Provider::HubSpot => &self.hubspot,
            Provider::Airtable => &self.airtable,
            Provider::Notion => &self.notion,
        }
    }

    fn provider_mut(&mut self, provider: Provider) -> &mut ProviderConfig {
        match provider {
            Provider::HubSpot => &mut self.hubspot,
            Provider::Airtable => &mut self.airtable,
            Provider::Notion => &mut self.notion,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default().with_env(|_| None);
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.frontend_url, "http://localhost:3000");
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert!(!config.hubspot.is_configured());
        assert_eq!(
            config.hubspot.redirect_uri,
            "http://localhost:8000/integrations/hubspot/oauth2callback"
        );
    }

    #[test]
    fn test_parse_toml() {
        let config = Config::from_toml(
            r#"
            [server]
            port = 9000
            frontend_url = "https://app.example.com"

            [store]
            backend = "memory"

            [notion]
            client_id = "notion-id"
            client_secret = "notion-secret"
            api_base = "http://127.0.0.1:1234"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.frontend_url, "https://app.example.com");
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.notion.is_configured());
        assert_eq!(config.notion.api_base.as_deref(), Some("http://127.0.0.1:1234"));
        assert!(config.notion.token_url.is_none());
    }

    #[test]
    fn test_env_wins() {
        let env: HashMap<&str, &str> = [
            ("HUBSPOT_CLIENT_ID", "env-id"),
            ("HUBSPOT_CLIENT_SECRET", "env-secret"),
            ("HUBSPOT_REDIRECT_URI", "https://api.example.com/cb"),
            ("REDIS_URL", "redis://cache:6379"),
            ("TETHER_PORT", "8080"),
        ]
        .into_iter()
        .collect();

        let config = Config::from_toml("[hubspot]\nclient_id = \"file-id\"\n")
            .unwrap()
            .with_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.hubspot.client_id, "env-id");
        assert_eq!(config.hubspot.client_secret, "env-secret");
        assert_eq!(config.hubspot.redirect_uri, "https://api.example.com/cb");
        assert_eq!(config.store.redis_url, "redis://cache:6379");
        assert_eq!(config.server.port, 8080);
        assert_eq!(
            config.provider(Provider::Airtable).redirect_uri,
            "http://localhost:8000/integrations/airtable/oauth2callback"
        );
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tether.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        assert!(matches!(Config::load(&path), Err(TetherError::Config(_))));
    }
}
