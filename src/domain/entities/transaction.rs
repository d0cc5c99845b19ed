//! Trade intents and the ledger entries they settle into

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::errors::LedgerError;
use crate::domain::value_objects::volume::Volume;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeSide {
    type Err = LedgerError;

    /// Only `buy` and `sell` are accepted; anything else is an input error
    /// rather than silently priced as a buy.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(TradeSide::Buy),
            "sell" => Ok(TradeSide::Sell),
            other => Err(LedgerError::invalid(format!(
                "transaction type must be 'buy' or 'sell', got '{}'",
                other
            ))),
        }
    }
}

/// A validated request to trade, alive only between submission and settlement
#[derive(Debug, Clone, PartialEq)]
pub struct TradeIntent {
    pub user_id: i64,
    pub ticker: String,
    pub side: TradeSide,
    pub volume: Volume,
}

/// Ledger entry; append-only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    /// `None` once the owning user has been deleted
    pub user_id: Option<i64>,
    pub ticker: String,
    pub side: TradeSide,
    pub volume: i64,
    pub price: f64,
    pub created_at: DateTime<Utc>,
}
