// src/valuation.rs
use crate::models::{round2, Holding, PortfolioTotal, StockYield};
use crate::quotes::{current_price_by_symbol, QuoteSource};
use log::warn;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Valuation {
    pub yields: Vec<StockYield>,
    pub total: PortfolioTotal,
}

pub async fn yield_of_single_stock(quotes: &dyn QuoteSource, holding: &Holding) -> StockYield {
    let symbol = holding.stock_symbol.as_str();
    let current_price = match current_price_by_symbol(quotes, symbol).await {
        Ok(price) => price,
        Err(e) => {
            warn!("Valuation skipped for {}: {}", symbol, e);
            return StockYield::errored(symbol);
        }
    };

    let delta = current_price - holding.purchase_price;
    StockYield {
        symbol: symbol.to_string(),
        current_price: Some(current_price),
        profit_in_usd: Some(round2(delta * holding.shares)),
        profit_prec: Some(round2(delta / holding.purchase_price * 100.0)),
        total_value: Some(round2(holding.shares * current_price)),
        error: false,
    }
}

/// Sums a set of yields. Errored rows still count toward quantity.
pub fn aggregate<'a>(rows: impl IntoIterator<Item = (&'a Holding, &'a StockYield)>) -> PortfolioTotal {
    let mut total = PortfolioTotal::default();
    for (holding, stock_yield) in rows {
        total.quantity += holding.shares;
        if stock_yield.error {
            continue;
        }
        total.value += stock_yield.total_value.unwrap_or_default();
        total.profit_loss += stock_yield.profit_in_usd.unwrap_or_default();
    }
    PortfolioTotal {
        quantity: round2(total.quantity),
        value: round2(total.value),
        profit_loss: round2(total.profit_loss),
    }
}

pub async fn valuate(quotes: &dyn QuoteSource, holdings: &[Holding]) -> Valuation {
    let mut yields = Vec::with_capacity(holdings.len());
    for holding in holdings {
        yields.push(yield_of_single_stock(quotes, holding).await);
    }
    let total = aggregate(holdings.iter().zip(yields.iter()));
    Valuation { yields, total }
}

#[allow(dead_code)]
pub async fn total(quotes: &dyn QuoteSource, holdings: &[Holding]) -> PortfolioTotal {
    valuate(quotes, holdings).await.total
}
