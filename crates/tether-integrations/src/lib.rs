pub mod airtable;
pub mod client;
pub mod http;
pub mod hubspot;
pub mod notion;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tether_core::config::{Config, ProviderConfig};
use tether_core::error::{Result, TetherError};
use tether_core::types::{AuthorizationState, Provider, StoredCredential};
use tether_store::CredentialStore;
use url::Url;

pub use crate::airtable::Airtable;
pub use crate::hubspot::HubSpot;
pub use crate::notion::Notion;

/// One connectable platform.
///
/// Implementors supply the provider-specific requests; the three operations
/// callers use (`build_authorization_url`, `exchange_code_for_token`,
/// `fetch_records`) are shared and handle validation and persistence.
#[async_trait]
pub trait Integration: Send + Sync {
    fn provider(&self) -> Provider;

    fn store(&self) -> &CredentialStore;

    /// Provider consent URL carrying `state`.
    async fn authorization_url(&self, state: &AuthorizationState) -> Result<Url>;

    /// Exchange `code` at the token endpoint. Returns the raw 200 body.
    async fn request_token(&self, code: &str, state: &AuthorizationState) -> Result<Value>;

    /// Authenticated list call. Returns the raw 200 body.
    async fn request_records(&self, access_token: &str) -> Result<Value>;

    async fn build_authorization_url(&self, user_id: &str, org_id: &str) -> Result<String> {
        let state = AuthorizationState::new(user_id, org_id)?;
        let url = self.authorization_url(&state).await?;
        tracing::debug!(provider = %self.provider(), user_id, org_id, "built authorization url");
        Ok(url.into())
    }

    /// Validate the callback, exchange the code, and persist the merged token document.
    /// Nothing is written unless the provider accepted the code.
    async fn exchange_code_for_token(
        &self,
        code: Option<&str>,
        state: Option<&str>,
    ) -> Result<StoredCredential> {
        let (Some(code), Some(state)) = (
            code.filter(|c| !c.is_empty()),
            state.filter(|s| !s.is_empty()),
        ) else {
            return Err(TetherError::MissingCallbackParams);
        };

        let state = AuthorizationState::parse(state)?;
        let body = self.request_token(code, &state).await?;
        let credential = StoredCredential::from_token_response(body, &state)?;

        self.store()
            .put(self.provider(), &state.user_id, &state.org_id, &credential)
            .await?;

        tracing::info!(
            provider = %self.provider(),
            user_id = %state.user_id,
            org_id = %state.org_id,
            "account connected"
        );
        Ok(credential)
    }

    async fn fetch_records(&self, credential: &StoredCredential) -> Result<Value> {
        let token = credential
            .access_token()
            .ok_or(TetherError::MissingAccessToken)?;
        let records = self.request_records(token).await?;
        tracing::info!(provider = %self.provider(), "records fetched");
        Ok(records)
    }

    /// Stored credential for the account, or the not-found placeholder.
    async fn credentials(&self, user_id: &str, org_id: &str) -> Result<StoredCredential> {
        self.store().get(self.provider(), user_id, org_id).await
    }
}

/// Construct the adapter for `provider`.
pub fn adapter(
    provider: Provider,
    config: &ProviderConfig,
    http: reqwest::Client,
    store: CredentialStore,
) -> Arc<dyn Integration> {
    match provider {
        Provider::HubSpot => Arc::new(HubSpot::new(config, http, store)),
        Provider::Airtable => Arc::new(Airtable::new(config, http, store)),
        Provider::Notion => Arc::new(Notion::new(config, http, store)),
    }
}

/// The configured adapters, keyed by provider.
#[derive(Clone, Default)]
pub struct Integrations {
    adapters: HashMap<Provider, Arc<dyn Integration>>,
}

impl Integrations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every provider that has a client id.
    pub fn from_config(config: &Config, http: reqwest::Client, store: CredentialStore) -> Self {
        let mut integrations = Self::new();
        for provider in Provider::ALL {
            let section = config.provider(provider);
            if !section.is_configured() {
                tracing::warn!(provider = %provider, "no client id configured, skipping");
                continue;
            }
            integrations.register(adapter(provider, section, http.clone(), store.clone()));
        }
        integrations
    }

    pub fn register(&mut self, integration: Arc<dyn Integration>) {
        self.adapters.insert(integration.provider(), integration);
    }

    pub fn get(&self, provider: Provider) -> Result<&Arc<dyn Integration>> {
        self.adapters
            .get(&provider)
            .ok_or(TetherError::ProviderNotConfigured(provider))
    }

    pub fn providers(&self) -> Vec<Provider> {
        let mut providers: Vec<_> = self.adapters.keys().copied().collect();
        providers.sort_by_key(|p| p.as_str());
        providers
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
