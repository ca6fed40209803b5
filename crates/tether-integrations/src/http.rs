use std::future::Future;
use std::sync::Arc;

use axum::extract::{Form, Path, Query, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tether_core::config::ServerConfig;
use tether_core::error::{Result, TetherError};
use tether_core::types::{Provider, StoredCredential};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::Integrations;

#[derive(Deserialize)]
pub struct IdentityForm {
    user_id: String,
    org_id: String,
}

#[derive(Deserialize)]
pub struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
pub struct LoadForm {
    /// JSON-encoded credential document, as returned by `/credentials`.
    credentials: String,
}

struct AppState {
    integrations: Integrations,
    frontend_url: String,
}

/// JSON error body: `{"error": message, "details": upstream body}`.
pub struct ApiError(TetherError);

impl From<TetherError> for ApiError {
    fn from(err: TetherError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            // Callers expect a 200 with an error body for an incomplete callback
            TetherError::MissingCallbackParams => StatusCode::OK,
            TetherError::MissingParameter(_)
            | TetherError::InvalidParameter(_)
            | TetherError::MalformedState(_)
            | TetherError::MissingAccessToken => StatusCode::BAD_REQUEST,
            TetherError::UnknownProvider(_) | TetherError::ProviderNotConfigured(_) => {
                StatusCode::NOT_FOUND
            }
            TetherError::TokenExchangeFailed { .. }
            | TetherError::UpstreamApi { .. }
            | TetherError::InvalidResponse(_)
            | TetherError::Integration(_) => StatusCode::BAD_GATEWAY,
            TetherError::Store(_) | TetherError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
            "Internal error".to_string()
        } else {
            self.0.to_string()
        };

        let mut body = json!({ "error": message });
        if let Some(details) = self.0.details() {
            body["details"] = Value::String(details.to_string());
        }

        (status, Json(body)).into_response()
    }
}

async fn ping() -> Json<Value> {
    Json(json!({"Ping": "Pong"}))
}

async fn authorize(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Form(form): Form<IdentityForm>,
) -> std::result::Result<Json<Value>, ApiError> {
    let integration = state.integrations.get(provider.parse::<Provider>()?)?;
    let url = integration
        .build_authorization_url(&form.user_id, &form.org_id)
        .await?;
    Ok(Json(json!({ "url": url })))
}

async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(params): Query<OAuthCallback>,
) -> std::result::Result<Response, ApiError> {
    let integration = state.integrations.get(provider.parse::<Provider>()?)?;

    if let Some(error) = params.error.as_deref() {
        tracing::warn!(provider = %integration.provider(), error, "authorization denied");
    }

    integration
        .exchange_code_for_token(params.code.as_deref(), params.state.as_deref())
        .await?;

    Ok(Redirect::to(&state.frontend_url).into_response())
}

async fn credentials(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Form(form): Form<IdentityForm>,
) -> std::result::Result<Json<StoredCredential>, ApiError> {
    let integration = state.integrations.get(provider.parse::<Provider>()?)?;
    let credential = integration.credentials(&form.user_id, &form.org_id).await?;
    Ok(Json(credential))
}

async fn load_records(
    state: &AppState,
    provider: Provider,
    form: LoadForm,
) -> std::result::Result<Json<Value>, ApiError> {
    let integration = state.integrations.get(provider)?;
    let credential: Value = serde_json::from_str(&form.credentials)
        .map_err(|_| TetherError::InvalidParameter("credentials".to_string()))?;
    let records = integration.fetch_records(&credential.into()).await?;
    Ok(Json(records))
}

async fn load(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Form(form): Form<LoadForm>,
) -> std::result::Result<Json<Value>, ApiError> {
    load_records(&state, provider.parse::<Provider>()?, form).await
}

/// Older frontend builds call this path instead of `/load`.
async fn load_hubspot(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoadForm>,
) -> std::result::Result<Json<Value>, ApiError> {
    load_records(&state, Provider::HubSpot, form).await
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
}

pub fn router(integrations: Integrations, config: &ServerConfig) -> Router {
    let state = Arc::new(AppState {
        integrations,
        frontend_url: config.frontend_url.clone(),
    });

    Router::new()
        .route("/", get(ping))
        .route("/integrations/{provider}/authorize", post(authorize))
        .route("/integrations/{provider}/oauth2callback", get(oauth_callback))
        .route("/integrations/{provider}/credentials", post(credentials))
        .route("/integrations/{provider}/load", post(load))
        .route("/integrations/hubspot/get_hubspot_items", post(load_hubspot))
        .with_state(state)
        .layer(cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http())
}

/// Serve the integration routes until `shutdown` completes.
pub async fn start_server<F>(
    config: &ServerConfig,
    integrations: Integrations,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(integrations, config);
    let addr = format!("{}:{}", config.host, config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| TetherError::Integration(format!("failed to bind {addr}: {e}")))?;

    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| TetherError::Integration(format!("server error: {e}")))?;

    Ok(())
}
