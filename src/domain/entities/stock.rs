//! Stock snapshots - an append-only price/volume series per ticker

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{LedgerError, LedgerResult};

/// One ingested snapshot; immutable once stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub id: i64,
    pub ticker: String,
    pub open_price: f64,
    pub close_price: f64,
    pub high: f64,
    pub low: f64,
    pub volume: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStockSnapshot {
    pub ticker: String,
    pub open_price: f64,
    pub close_price: f64,
    pub high: f64,
    pub low: f64,
    pub volume: i64,
}

impl NewStockSnapshot {
    pub fn validate(&self) -> LedgerResult<()> {
        if self.ticker.trim().is_empty() {
            return Err(LedgerError::invalid("ticker is required"));
        }

        let prices = [
            ("open_price", self.open_price),
            ("close_price", self.close_price),
            ("high", self.high),
            ("low", self.low),
        ];
        for (field, value) in prices {
            if !value.is_finite() || value < 0.0 {
                return Err(LedgerError::invalid(format!(
                    "{} must be a finite, non-negative price",
                    field
                )));
            }
        }

        if self.low > self.high {
            return Err(LedgerError::invalid(format!(
                "low ({}) must not exceed high ({})",
                self.low, self.high
            )));
        }
        if self.volume < 0 {
            return Err(LedgerError::invalid("volume must be non-negative"));
        }
        Ok(())
    }
}
