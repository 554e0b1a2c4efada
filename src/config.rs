// src/config.rs
use crate::error::AppError;
use log::LevelFilter;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const MEMORY_DATABASE: &str = "memory://";

#[derive(Debug, Clone)]
pub struct Config {
    pub secret_key: String,
    pub database_uri: String,
    pub client_secrets: PathBuf,
    pub callback_route: String,
    pub scopes: Vec<String>,
    pub session_cookie: String,
    pub cookie_secure: bool,
    pub public_url: String,
    pub alphavantage_api_key: String,
    pub ticker_data_dir: PathBuf,
    pub production: bool,
    pub bind: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let flag = |key: &str| var(key).map_or(false, |v| v.trim().eq_ignore_ascii_case("true"));

        let secret_key = var("SECRET_KEY").ok_or_else(|| {
            AppError::Config("SECRET_KEY environment variable is required".into())
        })?;
        let alphavantage_api_key = var("ALPHAVANTAGE_API_KEY").ok_or_else(|| {
            AppError::Config("ALPHAVANTAGE_API_KEY environment variable is required".into())
        })?;

        let production = flag("PRODUCTION");
        let bind: SocketAddr = if production {
            ([0, 0, 0, 0], 5000).into()
        } else {
            ([127, 0, 0, 1], 8001).into()
        };

        let mut callback_route =
            var("OIDC_CALLBACK_ROUTE").unwrap_or_else(|| "/oidc/callback".to_string());
        if !callback_route.starts_with('/') {
            callback_route.insert(0, '/');
        }

        Ok(Config {
            secret_key,
            database_uri: var("DATABASE_URI").unwrap_or_else(|| "127.0.0.1:9042".to_string()),
            client_secrets: var("OIDC_CLIENT_SECRETS")
                .unwrap_or_else(|| "client_secrets.json".to_string())
                .into(),
            callback_route,
            scopes: var("OIDC_SCOPES")
                .unwrap_or_else(|| "openid email profile".to_string())
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            session_cookie: var("OIDC_ID_TOKEN_COOKIE_NAME")
                .unwrap_or_else(|| "oidc_token".to_string()),
            cookie_secure: flag("OIDC_ID_TOKEN_COOKIE_SECURE") || flag("OIDC_COOKIE_SECURE"),
            public_url: var("PUBLIC_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| format!("http://{}", bind)),
            alphavantage_api_key,
            ticker_data_dir: var("TICKER_DATA_DIR")
                .unwrap_or_else(|| "data".to_string())
                .into(),
            production,
            bind,
        })
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_uri == MEMORY_DATABASE
    }

    pub fn log_level(&self) -> LevelFilter {
        if self.production {
            LevelFilter::Info
        } else {
            LevelFilter::Debug
        }
    }

    pub fn callback_url(&self) -> String {
        format!("{}{}", self.public_url, self.callback_route)
    }
}
