// src/db.rs
use crate::error::AppError;
use crate::models::Holding;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info};
use scylla::{frame::response::result::CqlValue, query::Query, Session, SessionBuilder};
use tokio::sync::Mutex;

/// The single holdings table. A (user, symbol) pair may only appear once.
#[async_trait]
pub trait HoldingStore: Send + Sync {
    async fn insert(&self, holding: Holding) -> Result<(), AppError>;

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Holding>, AppError>;

    /// Returns `false` when no holding with this id belongs to `user_id`.
    async fn remove(&self, user_id: &str, holding_id: &str) -> Result<bool, AppError>;
}

#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<Holding>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HoldingStore for MemoryStore {
    async fn insert(&self, holding: Holding) -> Result<(), AppError> {
        let mut rows = self.rows.lock().await;
        if rows
            .iter()
            .any(|h| h.user_id == holding.user_id && h.stock_symbol == holding.stock_symbol)
        {
            return Err(AppError::DuplicateHolding(holding.stock_symbol));
        }
        rows.push(holding);
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Holding>, AppError> {
        let rows = self.rows.lock().await;
        Ok(rows.iter().filter(|h| h.user_id == user_id).cloned().collect())
    }

    async fn remove(&self, user_id: &str, holding_id: &str) -> Result<bool, AppError> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|h| !(h.id == holding_id && h.user_id == user_id));
        Ok(rows.len() != before)
    }
}

pub struct ScyllaStore {
    session: Session,
}

impl ScyllaStore {
    pub async fn connect(node: &str) -> Result<Self, AppError> {
        let session = SessionBuilder::new().known_node(node).build().await?;

        session.query("CREATE KEYSPACE IF NOT EXISTS portfolio_tracker WITH REPLICATION = {'class': 'SimpleStrategy', 'replication_factor': 1}", &[]).await?;
        session
            .query(
                "CREATE TABLE IF NOT EXISTS portfolio_tracker.holdings (\
                 user_id TEXT, stock_symbol TEXT, id TEXT, full_name TEXT, \
                 shares DOUBLE, purchase_price DOUBLE, net_buy_price DOUBLE, \
                 logo TEXT, created_at TIMESTAMP, \
                 PRIMARY KEY (user_id, stock_symbol))",
                &[],
            )
            .await?;

        info!("Successfully connected to ScyllaDB at {}.", node);
        Ok(Self { session })
    }
}

#[async_trait]
impl HoldingStore for ScyllaStore {
    async fn insert(&self, holding: Holding) -> Result<(), AppError> {
        let query = Query::new(
            "INSERT INTO portfolio_tracker.holdings \
             (user_id, stock_symbol, id, full_name, shares, purchase_price, net_buy_price, logo, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) IF NOT EXISTS",
        );
        let result = self
            .session
            .query(
                query,
                (
                    holding.user_id.as_str(),
                    holding.stock_symbol.as_str(),
                    holding.id.as_str(),
                    holding.full_name.clone(),
                    holding.shares,
                    holding.purchase_price,
                    holding.net_buy_price,
                    holding.logo.clone(),
                    holding.created_at.timestamp_millis(),
                ),
            )
            .await?;

        // Lightweight transactions answer with an `[applied]` column first
        let applied = result
            .rows
            .and_then(|rows| rows.into_iter().next())
            .and_then(|row| row.columns.into_iter().next().flatten())
            .and_then(|value| value.as_boolean())
            .unwrap_or(false);

        if applied {
            Ok(())
        } else {
            Err(AppError::DuplicateHolding(holding.stock_symbol))
        }
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Holding>, AppError> {
        let query = Query::new(
            "SELECT id, stock_symbol, full_name, shares, purchase_price, net_buy_price, logo, created_at \
             FROM portfolio_tracker.holdings WHERE user_id = ?",
        );
        let result = self.session.query(query, (user_id,)).await?;

        let mut holdings: Vec<Holding> = result
            .rows
            .unwrap_or_default()
            .into_iter()
            .filter_map(|row| {
                let holding = row_to_holding(user_id, row.columns);
                if holding.is_none() {
                    error!("Skipping malformed holding row for user {}", user_id);
                }
                holding
            })
            .collect();
        holdings.sort_by_key(|h| h.created_at);
        Ok(holdings)
    }

    async fn remove(&self, user_id: &str, holding_id: &str) -> Result<bool, AppError> {
        // Rows are keyed by symbol, so resolve the id inside the user's partition
        let owned = self
            .list_for_user(user_id)
            .await?
            .into_iter()
            .find(|h| h.id == holding_id);

        match owned {
            Some(holding) => {
                let query = Query::new(
                    "DELETE FROM portfolio_tracker.holdings WHERE user_id = ? AND stock_symbol = ?",
                );
                self.session
                    .query(query, (user_id, holding.stock_symbol.as_str()))
                    .await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn text(value: &Option<CqlValue>) -> Option<String> {
    value.as_ref().and_then(|v| v.as_text()).cloned()
}

fn double(value: &Option<CqlValue>) -> Option<f64> {
    value.as_ref().and_then(|v| v.as_double())
}

fn row_to_holding(user_id: &str, columns: Vec<Option<CqlValue>>) -> Option<Holding> {
    if columns.len() < 8 {
        return None;
    }
    let created_at = match &columns[7] {
        Some(CqlValue::Timestamp(ts)) => {
            DateTime::<Utc>::from_timestamp_millis(ts.num_milliseconds()).unwrap_or_default()
        }
        _ => DateTime::<Utc>::default(),
    };
    Some(Holding {
        id: text(&columns[0])?,
        user_id: user_id.to_string(),
        stock_symbol: text(&columns[1])?,
        full_name: text(&columns[2]),
        shares: double(&columns[3])?,
        purchase_price: double(&columns[4])?,
        net_buy_price: double(&columns[5])?,
        logo: text(&columns[6]).filter(|l| !l.is_empty()),
        created_at,
    })
}
