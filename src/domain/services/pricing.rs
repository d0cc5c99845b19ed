//! Pricing Resolver
//!
//! Execution price is `volume * low` for a buy and `volume * high` for a
//! sell, taken from the snapshot captured when the trade was submitted.

use std::sync::Arc;

use crate::domain::entities::stock::StockSnapshot;
use crate::domain::entities::transaction::TradeSide;
use crate::domain::errors::{LedgerError, LedgerResult};
use crate::domain::repositories::ledger_store::LedgerStore;
use crate::domain::value_objects::price::Price;
use crate::domain::value_objects::volume::Volume;

/// Price of `volume` units of `snapshot` traded on `side`. Pure.
pub fn execution_price(
    snapshot: &StockSnapshot,
    side: TradeSide,
    volume: Volume,
) -> LedgerResult<Price> {
    let unit = match side {
        TradeSide::Buy => snapshot.low,
        TradeSide::Sell => snapshot.high,
    };

    Price::new(unit)
        .and_then(|unit| unit.times(volume))
        .map_err(|e| {
            LedgerError::invalid(format!(
                "cannot price {} {} of {} from snapshot {}: {}",
                side,
                volume.value(),
                snapshot.ticker,
                snapshot.id,
                e
            ))
        })
}

/// Looks up the current snapshot for a ticker and prices trades against it
#[derive(Clone)]
pub struct PricingResolver {
    store: Arc<dyn LedgerStore>,
}

impl PricingResolver {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Newest snapshot for `ticker`, or `NotFound`
    pub async fn current_snapshot(&self, ticker: &str) -> LedgerResult<StockSnapshot> {
        self.store
            .latest_snapshot(ticker)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("no stock data for ticker {}", ticker)))
    }

    /// Resolve the current snapshot and price a trade against it
    pub async fn quote(
        &self,
        ticker: &str,
        side: TradeSide,
        volume: Volume,
    ) -> LedgerResult<(StockSnapshot, Price)> {
        let snapshot = self.current_snapshot(ticker).await?;
        let price = execution_price(&snapshot, side, volume)?;
        Ok((snapshot, price))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::stock::NewStockSnapshot;
    use crate::persistence::repository::SqliteLedgerStore;
    use crate::persistence::{init_database, DatabaseConfig};
    use chrono::Utc;

    fn snapshot(low: f64, high: f64) -> StockSnapshot {
        StockSnapshot {
            id: 1,
            ticker: "AAPL".to_string(),
            open_price: 11.0,
            close_price: 11.5,
            high,
            low,
            volume: 1_000,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_buy_uses_low() {
        let price = execution_price(&snapshot(10.0, 12.0), TradeSide::Buy, Volume::new(50).unwrap());
        assert_eq!(price.unwrap().value(), 500.0);
    }

    #[test]
    fn test_sell_uses_high() {
        let price =
            execution_price(&snapshot(10.0, 12.0), TradeSide::Sell, Volume::new(200).unwrap());
        assert_eq!(price.unwrap().value(), 2400.0);
    }

    #[test]
    fn test_corrupt_snapshot_is_rejected() {
        let price = execution_price(&snapshot(-1.0, 12.0), TradeSide::Buy, Volume::new(1).unwrap());
        assert!(matches!(price, Err(LedgerError::InvalidInput(_))));
    }

    async fn resolver() -> (PricingResolver, Arc<SqliteLedgerStore>) {
        let pool = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        let store = Arc::new(SqliteLedgerStore::new(pool));
        (PricingResolver::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_unknown_ticker_is_not_found() {
        let (resolver, _store) = resolver().await;
        let result = resolver.current_snapshot("NOPE").await;
        assert!(matches!(result, Err(LedgerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_quote_uses_newest_snapshot() {
        let (resolver, store) = resolver().await;
        for (low, high) in [(10.0, 12.0), (20.0, 25.0)] {
            store
                .insert_snapshot(NewStockSnapshot {
                    ticker: "AAPL".to_string(),
                    open_price: low,
                    close_price: high,
                    high,
                    low,
                    volume: 100,
                })
                .await
                .unwrap();
        }

        let (snapshot, price) = resolver
            .quote("AAPL", TradeSide::Buy, Volume::new(3).unwrap())
            .await
            .unwrap();
        assert_eq!(snapshot.low, 20.0);
        assert_eq!(price.value(), 60.0);
    }
}
