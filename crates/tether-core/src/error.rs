use crate::types::Provider;

/// Every failure the connector can report to a caller.
///
/// Upstream variants keep the provider's raw status and body so the HTTP
/// surface can echo them back for debugging. Nothing here ever carries a
/// client secret.
#[derive(Debug, thiserror::Error)]
pub enum TetherError {
    /// OAuth callback arrived without `code` or `state`.
    #[error("Missing code or state")]
    MissingCallbackParams,
    #[error("Missing {0}")]
    MissingParameter(String),
    #[error("invalid {0}")]
    InvalidParameter(String),
    #[error("malformed state: {0}")]
    MalformedState(String),
    #[error("Token exchange failed")]
    TokenExchangeFailed {
        provider: Provider,
        status: u16,
        body: String,
    },
    #[error("Missing access token")]
    MissingAccessToken,
    #[error("{provider} API error")]
    UpstreamApi {
        provider: Provider,
        status: u16,
        body: String,
    },
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("provider not configured: {0}")]
    ProviderNotConfigured(Provider),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("integration error: {0}")]
    Integration(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("config error: {0}")]
    Config(String),
}

impl TetherError {
    /// Raw upstream body, for the variants that carry one.
    pub fn details(&self) -> Option<&str> {
        match self {
            Self::TokenExchangeFailed { body, .. } | Self::UpstreamApi { body, .. } => {
                Some(body.as_str())
            }
            _ => None,
        }
    }

    /// Upstream HTTP status, for the variants that carry one.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::TokenExchangeFailed { status, .. } | Self::UpstreamApi { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TetherError>;
