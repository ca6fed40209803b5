use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TetherError};

/// Access token value returned by credential lookups that found nothing.
pub const NOT_FOUND_TOKEN: &str = "not-found";

/// Unix epoch timestamp in seconds.
pub fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Third-party platforms a user can connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    HubSpot,
    Airtable,
    Notion,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::HubSpot, Provider::Airtable, Provider::Notion];

    /// Lower-case name used in storage keys, routes and env vars.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HubSpot => "hubspot",
            Self::Airtable => "airtable",
            Self::Notion => "notion",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HubSpot => "HubSpot",
            Self::Airtable => "Airtable",
            Self::Notion => "Notion",
        };
        f.write_str(name)
    }
}

impl FromStr for Provider {
    type Err = TetherError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hubspot" => Ok(Self::HubSpot),
            "airtable" => Ok(Self::Airtable),
            "notion" => Ok(Self::Notion),
            _ => Err(TetherError::UnknownProvider(s.to_string())),
        }
    }
}

/// Caller identity round-tripped through the provider as the OAuth `state`
/// parameter, encoded as `user_id:org_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationState {
    pub user_id: String,
    pub org_id: String,
}

impl AuthorizationState {
    /// Neither id may contain `:`, otherwise the encoded form would not parse back.
    pub fn new(user_id: impl Into<String>, org_id: impl Into<String>) -> Result<Self> {
        let user_id = user_id.into();
        let org_id = org_id.into();
        if user_id.contains(':') || org_id.contains(':') {
            return Err(TetherError::MalformedState(
                "user_id and org_id must not contain ':'".to_string(),
            ));
        }
        Ok(Self { user_id, org_id })
    }

    /// Parse a callback `state` value. Exactly one `:` separator is accepted.
    pub fn parse(state: &str) -> Result<Self> {
        let mut parts = state.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(user_id), Some(org_id), None) => Ok(Self {
                user_id: user_id.to_string(),
                org_id: org_id.to_string(),
            }),
            _ => Err(TetherError::MalformedState(format!(
                "expected 'user_id:org_id', got {} separator(s)",
                state.matches(':').count()
            ))),
        }
    }

    pub fn encode(&self) -> String {
        format!("{}:{}", self.user_id, self.org_id)
    }
}

impl fmt::Display for AuthorizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_id, self.org_id)
    }
}

impl FromStr for AuthorizationState {
    type Err = TetherError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Storage key for one connected account: `<provider>:<user_id>:<org_id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialKey(String);

impl CredentialKey {
    pub fn new(provider: Provider, user_id: &str, org_id: &str) -> Self {
        Self(format!("{}:{user_id}:{org_id}", provider.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw token-endpoint document plus the `user_id`/`org_id` that requested it.
///
/// The shape varies by provider, so it is kept as an opaque JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoredCredential(Map<String, Value>);

impl StoredCredential {
    /// Merge caller identity into a token response. Non-object bodies are rejected.
    pub fn from_token_response(body: Value, state: &AuthorizationState) -> Result<Self> {
        let Value::Object(mut map) = body else {
            return Err(TetherError::InvalidResponse(
                "token response is not a JSON object".to_string(),
            ));
        };
        map.insert("user_id".to_string(), Value::String(state.user_id.clone()));
        map.insert("org_id".to_string(), Value::String(state.org_id.clone()));
        Ok(Self(map))
    }

    /// Placeholder returned when nothing is stored for a key.
    pub fn not_found() -> Self {
        let mut map = Map::new();
        map.insert(
            "access_token".to_string(),
            Value::String(NOT_FOUND_TOKEN.to_string()),
        );
        Self(map)
    }

    pub fn is_not_found(&self) -> bool {
        self.0.get("access_token").and_then(Value::as_str) == Some(NOT_FOUND_TOKEN)
    }

    /// A usable bearer token: present, a non-empty string, and not the placeholder.
    pub fn access_token(&self) -> Option<&str> {
        self.0
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty() && *t != NOT_FOUND_TOKEN)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.0.get("user_id").and_then(Value::as_str)
    }

    pub fn org_id(&self) -> Option<&str> {
        self.0.get("org_id").and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for StoredCredential {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Anything that is not an object becomes an empty credential, which has no token.
impl From<Value> for StoredCredential {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self(Map::new()),
        }
    }
}
