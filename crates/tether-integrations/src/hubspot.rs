use async_trait::async_trait;
use serde_json::Value;
use tether_core::config::ProviderConfig;
use tether_core::error::Result;
use tether_core::types::{AuthorizationState, Provider};
use tether_store::CredentialStore;
use url::Url;

use crate::client::{self, Endpoints, OAuthApp};
use crate::Integration;

const AUTH_URL: &str = "https://app.hubspot.com/oauth/authorize";
const TOKEN_URL: &str = "https://api.hubapi.com/oauth/v1/token";
const API_BASE: &str = "https://api.hubapi.com";

/// Scopes requested for CRM contacts access.
const SCOPES: &str = "crm.objects.contacts.read crm.objects.contacts.write oauth";

/// HubSpot CRM. Client credentials travel in the token form body.
pub struct HubSpot {
    app: OAuthApp,
    store: CredentialStore,
    http: reqwest::Client,
}

impl HubSpot {
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
impl Integration for HubSpot {
    fn provider(&self) -> Provider {
        Provider::HubSpot
    }

    fn store(&self) -> &CredentialStore {
        &self.store
    }

    async fn authorization_url(&self, state: &AuthorizationState) -> Result<Url> {
        let state = state.encode();
        self.app.authorize_url(&[
            ("client_id", self.app.client_id.as_str()),
            ("redirect_uri", self.app.redirect_uri.as_str()),
            ("scope", SCOPES),
            ("state", state.as_str()),
            ("response_type", "code"),
        ])
    }

    async fn request_token(&self, code: &str, _state: &AuthorizationState) -> Result<Value> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.app.client_id.as_str()),
            ("client_secret", self.app.client_secret.as_str()),
            ("redirect_uri", self.app.redirect_uri.as_str()),
            ("code", code),
        ];

        client::token_request(
            Provider::HubSpot,
            self.http.post(&self.app.token_url).form(&params),
        )
        .await
    }

    async fn request_records(&self, access_token: &str) -> Result<Value> {
        client::records_request(
            Provider::HubSpot,
            self.http
                .get(self.app.api_url("/crm/v3/objects/contacts"))
                .bearer_auth(access_token)
                .header("Content-Type", "application/json"),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_core::error::TetherError;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: Option<&MockServer>) -> ProviderConfig {
        ProviderConfig {
            client_id: "hs-client".to_string(),
            client_secret: "hs-secret".to_string(),
            redirect_uri: "http://localhost:8000/integrations/hubspot/oauth2callback".to_string(),
            auth_url: None,
            token_url: server.map(|s| format!("{}/oauth/v1/token", s.uri())),
            api_base: server.map(|s| s.uri()),
        }
    }

    #[tokio::test]
    async fn test_authorization_url() {
        let hubspot = HubSpot::new(&config(None), reqwest::Client::new(), CredentialStore::in_memory());
        let url = hubspot.build_authorization_url("u1", "o1").await.unwrap();
        let url = Url::parse(&url).unwrap();

        assert_eq!(url.host_str(), Some("app.hubspot.com"));
        assert_eq!(url.path(), "/oauth/authorize");

        let params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            params,
            vec![
                ("client_id".to_string(), "hs-client".to_string()),
                (
                    "redirect_uri".to_string(),
                    "http://localhost:8000/integrations/hubspot/oauth2callback".to_string()
                ),
                ("scope".to_string(), SCOPES.to_string()),
                ("state".to_string(), "u1:o1".to_string()),
                ("response_type".to_string(), "code".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_state_round_trips_through_url() {
        let hubspot = HubSpot::new(&config(None), reqwest::Client::new(), CredentialStore::in_memory());
        for (user, org) in [("u1", "o1"), ("user@example.com", "org 42"), ("a&b=c", "%20"), ("", "")] {
            let url = hubspot.build_authorization_url(user, org).await.unwrap();
            let url = Url::parse(&url).unwrap();
            let state = url
                .query_pairs()
                .find(|(k, _)| k == "state")
                .map(|(_, v)| v.into_owned())
                .unwrap();
            let parsed = AuthorizationState::parse(&state).unwrap();
            assert_eq!((parsed.user_id.as_str(), parsed.org_id.as_str()), (user, org));
        }
    }

    #[tokio::test]
    async fn test_authorization_url_rejects_colon_ids() {
        let hubspot = HubSpot::new(&config(None), reqwest::Client::new(), CredentialStore::in_memory());
        assert!(matches!(
            hubspot.build_authorization_url("u:1", "o1").await,
            Err(TetherError::MalformedState(_))
        ));
    }

    #[tokio::test]
    async fn test_token_request_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/v1/token"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("client_id=hs-client"))
            .and(body_string_contains("client_secret=hs-secret"))
            .and(body_string_contains("code=the-code"))
            .and(body_string_contains(
                "redirect_uri=http%3A%2F%2Flocalhost%3A8000%2Fintegrations%2Fhubspot%2Foauth2callback",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok",
                "refresh_token": "ref",
                "expires_in": 1800,
                "token_type": "bearer",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let hubspot = HubSpot::new(
            &config(Some(&server)),
            reqwest::Client::new(),
            CredentialStore::in_memory(),
        );
        let credential = hubspot
            .exchange_code_for_token(Some("the-code"), Some("u1:o1"))
            .await
            .unwrap();

        assert_eq!(credential.access_token(), Some("tok"));
        assert_eq!(credential.as_map()["expires_in"], json!(1800));
        assert_eq!(credential.user_id(), Some("u1"));
        assert_eq!(credential.org_id(), Some("o1"));
    }

    #[tokio::test]
    async fn test_records_request_sends_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/crm/v3/objects/contacts"))
            .and(header("authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": [{"id": "7"}]})))
            .expect(1)
            .mount(&server)
            .await;

        let hubspot = HubSpot::new(
            &config(Some(&server)),
            reqwest::Client::new(),
            CredentialStore::in_memory(),
        );
        let records = hubspot.request_records("abc").await.unwrap();
        assert_eq!(records, json!({"results": [{"id": "7"}]}));
    }

    #[tokio::test]
    async fn test_records_error_carries_upstream_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/crm/v3/objects/contacts"))
            .respond_with(ResponseTemplate::new(401).set_body_string("{\"status\":\"error\"}"))
            .mount(&server)
            .await;

        let hubspot = HubSpot::new(
            &config(Some(&server)),
            reqwest::Client::new(),
            CredentialStore::in_memory(),
        );
        let err = hubspot.request_records("expired").await.unwrap_err();

        assert_eq!(err.upstream_status(), Some(401));
        assert_eq!(err.details(), Some("{\"status\":\"error\"}"));
        assert_eq!(err.to_string(), "HubSpot API error");
    }
}
