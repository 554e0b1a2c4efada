// src/forms.rs
use crate::catalog::TickerCatalog;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddStockForm {
    #[serde(default)]
    pub stock_symbol: String,
    #[serde(default)]
    pub purchase_price: String,
    #[serde(default)]
    pub num_of_shares: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedStock {
    pub stock_symbol: String,
    pub purchase_price: f64,
    pub num_of_shares: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoveStockForm {
    #[serde(default)]
    pub stock_id: String,
}

impl AddStockForm {
    /// Collects every field error instead of stopping at the first.
    pub fn validate(&self, catalog: &TickerCatalog) -> Result<ValidatedStock, Vec<String>> {
        let mut errors = Vec::new();

        let symbol = self.stock_symbol.trim();
        if symbol.is_empty() {
            errors.push("Stock symbol is required".to_string());
        } else if !catalog.contains(symbol) {
            errors.push(format!("Stock \"{}\" was not found", symbol));
        }

        let purchase_price = positive_number(&self.purchase_price, &mut errors);
        let num_of_shares = positive_number(&self.num_of_shares, &mut errors);

        match (purchase_price, num_of_shares) {
            (Some(purchase_price), Some(num_of_shares)) if errors.is_empty() => Ok(ValidatedStock {
                stock_symbol: symbol.to_uppercase(),
                purchase_price,
                num_of_shares,
            }),
            _ => Err(errors),
        }
    }
}

fn positive_number(raw: &str, errors: &mut Vec<String>) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        errors.push("This field is required".to_string());
        return None;
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => Some(value),
        Ok(value) if value.is_nan() => {
            errors.push("Please enter numbers only".to_string());
            None
        }
        Ok(_) => {
            errors.push("Please enter a positive number".to_string());
            None
        }
        Err(_) => {
            errors.push("Please enter numbers only".to_string());
            None
        }
    }
}
