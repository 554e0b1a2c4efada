// src/quotes.rs
use crate::error::AppError;
use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::Deserialize;

const ALPHA_VANTAGE_URL: &str = "https://www.alphavantage.co/query";

/// Live price lookup for a single symbol.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn current_price(&self, symbol: &str) -> Result<f64, AppError>;
}

/// Fetches and sanity-checks a price. Anything that is not a positive finite
/// number is treated as a failed fetch.
pub async fn current_price_by_symbol(
    source: &dyn QuoteSource,
    stock_symbol: &str,
) -> Result<f64, AppError> {
    let symbol = stock_symbol.to_uppercase();
    match source.current_price(&symbol).await {
        Ok(price) if price.is_finite() && price > 0.0 => Ok(price),
        Ok(_) | Err(AppError::InvalidPrice(_)) => Err(AppError::InvalidPrice(stock_symbol.into())),
        Err(e @ AppError::Quote { .. }) => Err(e),
        Err(e) => Err(AppError::Quote {
            symbol: stock_symbol.to_string(),
            message: e.to_string(),
        }),
    }
}

#[derive(Deserialize)]
struct GlobalQuote {
    #[serde(rename = "05. price")]
    price: Option<String>,
}

#[derive(Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

pub struct AlphaVantageQuotes {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AlphaVantageQuotes {
    pub fn new(client: Client, api_key: String) -> Self {
        Self {
            client,
            api_key,
            base_url: ALPHA_VANTAGE_URL.to_string(),
        }
    }
}

#[async_trait]
impl QuoteSource for AlphaVantageQuotes {
    async fn current_price(&self, symbol: &str) -> Result<f64, AppError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("function", "GLOBAL_QUOTE"),
                ("symbol", symbol),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            error!(
                "Failed to fetch quote for {}: HTTP {}",
                symbol,
                response.status()
            );
            return Err(AppError::Quote {
                symbol: symbol.to_string(),
                message: format!("HTTP {}", response.status()),
            });
        }

        let body = response.json::<GlobalQuoteResponse>().await?;
        parse_global_quote(symbol, body)
    }
}

fn parse_global_quote(symbol: &str, body: GlobalQuoteResponse) -> Result<f64, AppError> {
    if let Some(message) = body.error_message.or(body.note) {
        return Err(AppError::Quote {
            symbol: symbol.to_string(),
            message,
        });
    }
    let raw = body
        .global_quote
        .and_then(|q| q.price)
        .ok_or_else(|| AppError::InvalidPrice(symbol.to_string()))?;
    debug!("Quote for {}: {}", symbol, raw);
    raw.trim()
        .parse::<f64>()
        .map_err(|_| AppError::InvalidPrice(symbol.to_string()))
}
