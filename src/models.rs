// src/models.rs
use crate::catalog::TickerCatalog;
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub id: String,
    pub user_id: String,
    pub full_name: Option<String>,
    pub stock_symbol: String,
    pub shares: f64,
    pub purchase_price: f64,
    pub net_buy_price: f64,
    pub logo: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Holding {
    pub fn new(
        user_id: &str,
        stock_symbol: &str,
        shares: f64,
        purchase_price: f64,
        catalog: &TickerCatalog,
    ) -> Result<Self, AppError> {
        let symbol = stock_symbol.trim().to_uppercase();
        let entry = catalog
            .full_name(&symbol)
            .ok_or_else(|| AppError::UnknownSymbol(symbol.clone()))?;
        let logo = catalog.logo_url(&symbol).map(str::to_string);

        Ok(Holding {
            id: Uuid::new_v4().simple().to_string(),
            user_id: user_id.to_string(),
            full_name: Some(entry.company.clone()),
            stock_symbol: symbol,
            shares,
            purchase_price,
            net_buy_price: round2(shares * purchase_price),
            logo,
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockYield {
    pub symbol: String,
    pub current_price: Option<f64>,
    pub profit_in_usd: Option<f64>,
    pub profit_prec: Option<f64>,
    pub total_value: Option<f64>,
    pub error: bool,
}

impl StockYield {
    pub fn errored(symbol: &str) -> Self {
        StockYield {
            symbol: symbol.to_string(),
            current_price: None,
            profit_in_usd: None,
            profit_prec: None,
            total_value: None,
            error: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PortfolioTotal {
    pub quantity: f64,
    pub value: f64,
    pub profit_loss: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlashLevel {
    #[serde(rename = "alert-success")]
    Success,
    #[serde(rename = "alert-warning")]
    Warning,
    #[serde(rename = "alert-danger")]
    Danger,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Flash {
            level: FlashLevel::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Flash {
            level: FlashLevel::Warning,
            message: message.into(),
        }
    }

    pub fn danger(message: impl Into<String>) -> Self {
        Flash {
            level: FlashLevel::Danger,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::sample_catalog;

    #[test]
    fn new_holding_resolves_metadata() {
        let catalog = sample_catalog();
        let holding = Holding::new("user-1", " aapl ", 2.0, 150.255, &catalog).unwrap();

        assert_eq!(holding.stock_symbol, "AAPL");
        assert_eq!(holding.full_name.as_deref(), Some("Apple Inc."));
        assert_eq!(
            holding.logo.as_deref(),
            Some("https://logo.clearbit.com/apple.com")
        );
        assert_eq!(holding.id.len(), 32);
        assert_eq!(holding.user_id, "user-1");
    }

    #[test]
    fn cost_basis_is_rounded_product() {
        let catalog = sample_catalog();
        for (shares, price) in [(3.0, 10.333), (0.5, 99.99), (7.25, 41.1)] {
            let holding = Holding::new("u", "MSFT", shares, price, &catalog).unwrap();
            assert_eq!(holding.net_buy_price, round2(shares * price));
        }
    }

    #[test]
    fn missing_logo_is_none() {
        let holding = Holding::new("u", "NVDA", 1.0, 51.0, &sample_catalog()).unwrap();
        assert!(holding.logo.is_none());
    }

    #[test]
    fn unknown_symbol_is_rejected() {
        let err = Holding::new("u", "zzzz", 1.0, 1.0, &sample_catalog()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Stock symbol \"ZZZZ\" not found in database"
        );
    }

    #[test]
    fn flash_levels_serialize_as_css_classes() {
        let json = serde_json::to_string(&Flash::warning("careful")).unwrap();
        assert_eq!(json, r#"{"level":"alert-warning","message":"careful"}"#);
    }

    #[test]
    fn round2_behaviour() {
        assert_eq!(round2(1.005 * 1000.0), 1005.0);
        assert_eq!(round2(2.345_6), 2.35);
        assert_eq!(round2(-2.344), -2.34);
    }
}
