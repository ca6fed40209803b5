use async_trait::async_trait;
use serde_json::{json, Value};
use tether_core::config::ProviderConfig;
use tether_core::error::Result;
use tether_core::types::{AuthorizationState, Provider};
use tether_store::CredentialStore;
use url::Url;

use crate::client::{self, Endpoints, OAuthApp};
use crate::Integration;

const AUTH_URL: &str = "https://api.notion.com/v1/oauth/authorize";
const TOKEN_URL: &str = "https://api.notion.com/v1/oauth/token";
const API_BASE: &str = "https://api.notion.com";

const NOTION_VERSION: &str = "2022-06-28";

/// Notion. Scopes are chosen by the user on the consent page, so none are sent.
pub struct Notion {
    app: OAuthApp,
    store: CredentialStore,
    http: reqwest::Client,
}

impl Notion {
    pub fn new(config: &ProviderConfig, http: reqwest::Client, store: CredentialStore) -> Self {
        Self {
            app: OAuthApp::new(
                config,
                Endpoints {
                    auth_url: AUTH_URL,
                    token_url: TOKEN_URL,
                    api_base: API_BASE,
                },
            ),
            store,
            http,
        }
    }
}

#[async_trait]
impl Integration for Notion {
    fn provider(&self) -> Provider {
        Provider::Notion
    }

    fn store(&self) -> &CredentialStore {
        &self.store
    }

    async fn authorization_url(&self, state: &AuthorizationState) -> Result<Url> {
        let state = state.encode();
        self.app.authorize_url(&[
            ("client_id", self.app.client_id.as_str()),
            ("redirect_uri", self.app.redirect_uri.as_str()),
            ("owner", "user"),
            ("state", state.as_str()),
            ("response_type", "code"),
        ])
    }

    /// Notion takes a JSON body and Basic client credentials.
    async fn request_token(&self, code: &str, _state: &AuthorizationState) -> Result<Value> {
        let body = json!({
            "grant_type": "authorization_code",
            "code": code,
            "redirect_uri": self.app.redirect_uri,
        });

        client::token_request(
            Provider::Notion,
            self.http
                .post(&self.app.token_url)
                .basic_auth(&self.app.client_id, Some(&self.app.client_secret))
                .json(&body),
        )
        .await
    }

    /// Search with no query lists every page and database shared with the integration.
    async fn request_records(&self, access_token: &str) -> Result<Value> {
        client::records_request(
            Provider::Notion,
            self.http
                .post(self.app.api_url("/v1/search"))
                .bearer_auth(access_token)
                .header("Notion-Version", NOTION_VERSION)
                .json(&json!({})),
        )
        .await
    }
}
