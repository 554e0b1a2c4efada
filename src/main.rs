// src/main.rs
mod api;
mod auth;
mod catalog;
mod config;
mod db;
mod error;
mod forms;
mod models;
mod quotes;
mod valuation;

use crate::api::AppState;
use crate::auth::{ClientSecrets, OidcClient, TokenSigner};
use crate::catalog::CatalogCache;
use crate::config::Config;
use crate::db::{HoldingStore, MemoryStore, ScyllaStore};
use crate::error::AppError;
use crate::quotes::AlphaVantageQuotes;
use env_logger::Builder;
use log::{error, info, warn};
use reqwest::Client;
use std::sync::Arc;

async fn build_state(config: &Config) -> Result<AppState, AppError> {
    let store: Arc<dyn HoldingStore> = if config.uses_memory_store() {
        warn!("Using the in-memory store; holdings are lost on restart");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(ScyllaStore::connect(&config.database_uri).await?)
    };
    info!("Connected to database...");

    let secrets = ClientSecrets::from_file(&config.client_secrets)?;
    let redirect_uri = secrets
        .redirect_uris
        .first()
        .cloned()
        .unwrap_or_else(|| config.callback_url());

    let client = Client::new();
    let catalog = Arc::new(CatalogCache::new(&config.ticker_data_dir));
    // Fail fast on missing reference files instead of on the first request
    catalog.get()?;

    Ok(AppState {
        store,
        quotes: Arc::new(AlphaVantageQuotes::new(
            client.clone(),
            config.alphavantage_api_key.clone(),
        )),
        catalog,
        signer: TokenSigner::new(&config.secret_key),
        oidc: Arc::new(OidcClient::new(
            secrets,
            redirect_uri,
            config.scopes.clone(),
            client,
        )),
        session_cookie: config.session_cookie.clone(),
        cookie_secure: config.cookie_secure,
        callback_route: config.callback_route.clone(),
    })
}

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return;
        }
    };

    Builder::new()
        .filter_level(config.log_level())
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    info!("Starting the portfolio tracker application...");
    let state = match build_state(&config).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize: {}", e);
            return;
        }
    };

    let api = api::routes(state);

    info!("Server running on http://{}", config.bind);
    warp::serve(api).run(config.bind).await;
}
