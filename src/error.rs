// src/error.rs
use thiserror::Error;
use warp::http::StatusCode;
use warp::reject::Reject;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Stock symbol \"{0}\" not found in database")]
    UnknownSymbol(String),

    #[error("{0} is already in your portfolio")]
    DuplicateHolding(String),

    #[error("Invalid price data for stock symbol \"{0}\"")]
    InvalidPrice(String),

    #[error("Failed to fetch price for \"{symbol}\": {message}")]
    Quote { symbol: String, message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Reference data error: {0}")]
    Catalog(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::UnknownSymbol(_) => StatusCode::BAD_REQUEST,
            AppError::DuplicateHolding(_) => StatusCode::CONFLICT,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::InvalidPrice(_) | AppError::Quote { .. } | AppError::Network(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Database(_) | AppError::Catalog(_) | AppError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl Reject for AppError {}

impl From<scylla::transport::errors::QueryError> for AppError {
    fn from(e: scylla::transport::errors::QueryError) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<scylla::transport::errors::NewSessionError> for AppError {
    fn from(e: scylla::transport::errors::NewSessionError) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        AppError::Auth(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        // reqwest errors carry the full URL, api keys included
        let msg = e.to_string();
        let sanitized = match msg.find('?') {
            Some(idx) => format!("{}?<query redacted>", &msg[..idx]),
            None => msg,
        };
        AppError::Network(sanitized)
    }
}

impl From<csv::Error> for AppError {
    fn from(e: csv::Error) -> Self {
        AppError::Catalog(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Config(e.to_string())
    }
}
