use std::time::Duration;

use serde_json::Value;
use tether_core::config::ProviderConfig;
use tether_core::error::{Result, TetherError};
use tether_core::types::Provider;
use url::Url;

/// Build the outbound client shared by every adapter.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| TetherError::Integration(format!("failed to build http client: {e}")))
}

/// Fixed production endpoints of one provider.
pub(crate) struct Endpoints {
    pub auth_url: &'static str,
    pub token_url: &'static str,
    pub api_base: &'static str,
}

/// OAuth app registration plus resolved endpoints, shared by all adapters.
pub(crate) struct OAuthApp {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub api_base: String,
}

impl OAuthApp {
    /// Config overrides win over the provider's fixed endpoints.
    pub fn new(config: &ProviderConfig, defaults: Endpoints) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            auth_url: config
                .auth_url
                .clone()
                .unwrap_or_else(|| defaults.auth_url.to_string()),
            token_url: config
                .token_url
                .clone()
                .unwrap_or_else(|| defaults.token_url.to_string()),
            api_base: config
                .api_base
                .clone()
                .unwrap_or_else(|| defaults.api_base.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    /// Authorization endpoint with form-encoded query parameters.
    pub fn authorize_url(&self, params: &[(&str, &str)]) -> Result<Url> {
        Url::parse_with_params(&self.auth_url, params)
            .map_err(|e| TetherError::Config(format!("invalid authorization url: {e}")))
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }
}

/// Send a request and read the whole body, whatever the status.
async fn send(request: reqwest::RequestBuilder, what: &str) -> Result<(u16, String)> {
    let resp = request
        .send()
        .await
        .map_err(|e| TetherError::Integration(format!("{what} request failed: {e}")))?;

    let status = resp.status().as_u16();
    let text = resp
        .text()
        .await
        .map_err(|e| TetherError::Integration(format!("{what} read failed: {e}")))?;

    Ok((status, text))
}

fn parse_json(text: &str, what: &str) -> Result<Value> {
    serde_json::from_str(text)
        .map_err(|e| TetherError::InvalidResponse(format!("{what} parse failed: {e}")))
}

/// Token endpoint call: anything but 200 is `TokenExchangeFailed`.
pub(crate) async fn token_request(
    provider: Provider,
    request: reqwest::RequestBuilder,
) -> Result<Value> {
    let (status, body) = send(request, &format!("{} token", provider.as_str())).await?;

    if status != 200 {
        tracing::warn!(provider = %provider, status, "token exchange rejected");
        return Err(TetherError::TokenExchangeFailed {
            provider,
            status,
            body,
        });
    }

    parse_json(&body, &format!("{} token", provider.as_str()))
}

/// Records endpoint call: anything but 200 is `UpstreamApi`.
pub(crate) async fn records_request(
    provider: Provider,
    request: reqwest::RequestBuilder,
) -> Result<Value> {
    let (status, body) = send(request, &format!("{} records", provider.as_str())).await?;

    if status != 200 {
        tracing::warn!(provider = %provider, status, "records request rejected");
        return Err(TetherError::UpstreamApi {
            provider,
            status,
            body,
        });
    }

    parse_json(&body, &format!("{} records", provider.as_str()))
}
