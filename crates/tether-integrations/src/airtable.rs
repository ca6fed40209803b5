use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tether_core::config::ProviderConfig;
use tether_core::error::{Result, TetherError};
use tether_core::types::{AuthorizationState, Provider};
use tether_store::CredentialStore;
use url::Url;

use crate::client::{self, Endpoints, OAuthApp};
use crate::Integration;

const AUTH_URL: &str = "https://airtable.com/oauth2/v1/authorize";
const TOKEN_URL: &str = "https://airtable.com/oauth2/v1/token";
const API_BASE: &str = "https://api.airtable.com";

const SCOPES: &str = "data.records:read data.records:write \
                      data.recordComments:read data.recordComments:write \
                      schema.bases:read schema.bases:write";

/// How long a PKCE verifier waits for its callback.
const VERIFIER_TTL: Duration = Duration::from_secs(600);

fn verifier_key(state: &AuthorizationState) -> String {
    format!("airtable_verifier:{}:{}", state.user_id, state.org_id)
}

/// Random code verifier and its S256 challenge.
fn pkce_pair() -> (String, String) {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let verifier = URL_SAFE_NO_PAD.encode(bytes);
    let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
    (verifier, challenge)
}

/// Airtable. Requires PKCE; client credentials go in a Basic auth header.
pub struct Airtable {
    app: OAuthApp,
    store: CredentialStore,
    http: reqwest::Client,
}

impl Airtable {
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
impl Integration for Airtable {
    fn provider(&self) -> Provider {
        Provider::Airtable
    }

    fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Stashes the PKCE verifier under the caller's identity; a second
    /// authorize for the same account replaces it.
    async fn authorization_url(&self, state: &AuthorizationState) -> Result<Url> {
        let (verifier, challenge) = pkce_pair();
        self.store
            .stash(&verifier_key(state), &verifier, VERIFIER_TTL)
            .await?;

        let state = state.encode();
        self.app.authorize_url(&[
            ("client_id", self.app.client_id.as_str()),
            ("redirect_uri", self.app.redirect_uri.as_str()),
            ("scope", SCOPES),
            ("state", state.as_str()),
            ("response_type", "code"),
            ("code_challenge", challenge.as_str()),
            ("code_challenge_method", "S256"),
        ])
    }

    async fn request_token(&self, code: &str, state: &AuthorizationState) -> Result<Value> {
        let verifier = self
            .store
            .take(&verifier_key(state))
            .await?
            .ok_or_else(|| TetherError::MissingParameter("code_verifier".to_string()))?;

        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.app.client_id.as_str()),
            ("redirect_uri", self.app.redirect_uri.as_str()),
            ("code", code),
            ("code_verifier", verifier.as_str()),
        ];

        client::token_request(
            Provider::Airtable,
            self.http
                .post(&self.app.token_url)
                .basic_auth(&self.app.client_id, Some(&self.app.client_secret))
                .form(&params),
        )
        .await
    }

    async fn request_records(&self, access_token: &str) -> Result<Value> {
        client::records_request(
            Provider::Airtable,
            self.http
                .get(self.app.api_url("/v0/meta/bases"))
                .bearer_auth(access_token),
        )
        .await
    }
}
