use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use tether_core::config::Config;
use tether_integrations::client::http_client;
use tether_integrations::http::start_server;
use tether_integrations::Integrations;
use tether_store::CredentialStore;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; real deployments set the environment directly
    dotenvy::dotenv().ok();
    init_tracing()?;

    let config_path =
        std::env::var("TETHER_CONFIG").unwrap_or_else(|_| "tether.toml".to_string());
    let config = Config::load(Path::new(&config_path)).context("failed to load config")?;

    let store = CredentialStore::open(&config.store)
        .await
        .context("failed to open credential store")?;
    let http = http_client(Duration::from_secs(config.server.request_timeout_secs))?;

    let integrations = Integrations::from_config(&config, http, store);
    if integrations.is_empty() {
        tracing::warn!("no providers configured; set HUBSPOT_CLIENT_ID, AIRTABLE_CLIENT_ID or NOTION_CLIENT_ID");
    } else {
        tracing::info!(providers = ?integrations.providers(), "tether: starting");
    }

    start_server(&config.server, integrations, shutdown_signal()).await?;

    tracing::info!("tether: stopped");
    Ok(())
}

/// `RUST_LOG` controls the filter; defaults to `info`.
fn init_tracing() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to create env filter")?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(env_filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
