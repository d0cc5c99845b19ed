//! Ledger Service
//!
//! Use cases behind every HTTP operation: accounts, market data ingest,
//! ledger queries and trade submission.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::TokenIssuer;
use crate::domain::entities::settlement::SettlementRecord;
use crate::domain::entities::stock::{NewStockSnapshot, StockSnapshot};
use crate::domain::entities::transaction::{TradeIntent, TradeSide, Transaction};
use crate::domain::entities::user::{NewUser, UserProfile};
use crate::domain::errors::{LedgerError, LedgerResult};
use crate::domain::repositories::ledger_store::LedgerStore;
use crate::domain::services::pricing::PricingResolver;
use crate::domain::services::read_through::{user_key, ReadThrough, ALL_STOCK_DATA_KEY};
use crate::domain::services::settlement::{SettlementHandle, SettlementWorker};
use crate::domain::value_objects::volume::Volume;

/// Account creation input
#[derive(Debug, Clone)]
pub struct Signup {
    pub username: String,
    pub email: String,
    pub password: String,
    pub balance: f64,
}

/// Trade submission input, before validation
#[derive(Debug, Clone)]
pub struct TradeOrder {
    pub user_id: Option<i64>,
    pub ticker: String,
    pub side: String,
    pub volume: i64,
}

pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    cache: ReadThrough,
    tokens: Arc<TokenIssuer>,
    settlements: Arc<SettlementWorker>,
    pricing: PricingResolver,
    password_hash_cost: u32,
}

impl LedgerService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        cache: ReadThrough,
        tokens: Arc<TokenIssuer>,
        settlements: Arc<SettlementWorker>,
        password_hash_cost: u32,
    ) -> Self {
        Self {
            pricing: PricingResolver::new(store.clone()),
            store,
            cache,
            tokens,
            settlements,
            password_hash_cost,
        }
    }

    pub async fn signup(&self, signup: Signup) -> LedgerResult<UserProfile> {
        if signup.password.is_empty() {
            return Err(LedgerError::invalid("password is required"));
        }

        let mut user = NewUser {
            username: signup.username.trim().to_string(),
            email: signup.email.trim().to_string(),
            balance: signup.balance,
            password_hash: String::new(),
        };
        user.validate()?;

        let cost = self.password_hash_cost;
        let password = signup.password;
        user.password_hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| LedgerError::dependency(format!("password hashing task failed: {}", e)))?
            .map_err(|e| LedgerError::dependency(format!("password hashing failed: {}", e)))?;

        let created = self.store.create_user(user).await?;
        info!(user_id = created.id, username = %created.username, "User created");
        Ok(created.profile())
    }

    /// Verify credentials and issue a bearer token
    pub async fn login(&self, username: &str, password: &str) -> LedgerResult<String> {
        let user = self
            .store
            .find_user_by_username(username.trim())
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("user {}", username.trim())))?;

        let hash = user.password_hash.clone();
        let password = password.to_string();
        let valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| LedgerError::dependency(format!("password check task failed: {}", e)))?
            .map_err(|e| {
                warn!(user_id = user.id, "Stored password hash is unusable: {}", e);
                LedgerError::Unauthorized("invalid credentials".to_string())
            })?;

        if !valid {
            warn!(user_id = user.id, "Login with wrong password");
            return Err(LedgerError::Unauthorized("invalid credentials".to_string()));
        }

        debug!(user_id = user.id, "Issued token");
        self.tokens.issue(user.id)
    }

    pub async fn user_profile(&self, username: &str) -> LedgerResult<UserProfile> {
        self.cache
            .get_or_load(&user_key(username), || async {
                self.store
                    .find_user_by_username(username)
                    .await?
                    .map(|user| user.profile())
                    .ok_or_else(|| LedgerError::not_found(format!("user {}", username)))
            })
            .await
    }

    pub async fn ingest_snapshot(&self, mut snapshot: NewStockSnapshot) -> LedgerResult<StockSnapshot> {
        snapshot.ticker = snapshot.ticker.trim().to_string();
        snapshot.validate()?;

        let stored = self.store.insert_snapshot(snapshot).await?;
        self.cache.invalidate(ALL_STOCK_DATA_KEY).await;
        Ok(stored)
    }

    pub async fn all_snapshots(&self) -> LedgerResult<Vec<StockSnapshot>> {
        self.cache
            .get_or_load(ALL_STOCK_DATA_KEY, || self.store.list_snapshots())
            .await
    }

    /// Snapshots for one ticker, newest first; an unknown ticker is `NotFound`
    pub async fn snapshots_for_ticker(&self, ticker: &str) -> LedgerResult<Vec<StockSnapshot>> {
        let snapshots = self.store.snapshots_for_ticker(ticker).await?;
        if snapshots.is_empty() {
            return Err(LedgerError::not_found(format!("no stock data for ticker {}", ticker)));
        }
        Ok(snapshots)
    }

    pub async fn transactions_for_user(&self, user_id: i64) -> LedgerResult<Vec<Transaction>> {
        let transactions = self.store.transactions_for_user(user_id).await?;
        if transactions.is_empty() {
            return Err(LedgerError::not_found(format!(
                "no transactions for user {}",
                user_id
            )));
        }
        Ok(transactions)
    }

    /// Validate an order, capture the current snapshot and hand the intent
    /// to the settlement worker. Returns once the settlement is queued.
    pub async fn submit_trade(
        &self,
        authenticated_user: i64,
        order: TradeOrder,
    ) -> LedgerResult<SettlementHandle> {
        let user_id = order.user_id.unwrap_or(authenticated_user);
        if user_id != authenticated_user {
            warn!(
                authenticated_user,
                requested_user = user_id,
                "Trade submitted on behalf of another user"
            );
            return Err(LedgerError::Unauthorized(
                "cannot trade on behalf of another user".to_string(),
            ));
        }

        let ticker = order.ticker.trim().to_string();
        if ticker.is_empty() {
            return Err(LedgerError::invalid("ticker is required"));
        }
        let side: TradeSide = order.side.parse()?;
        let volume = Volume::new(order.volume).map_err(LedgerError::InvalidInput)?;

        let (snapshot, indicative) = self.pricing.quote(&ticker, side, volume).await?;
        debug!(
            user_id,
            ticker = %ticker,
            snapshot_id = snapshot.id,
            "Indicative price {}",
            indicative
        );

        let intent = TradeIntent {
            user_id,
            ticker,
            side,
            volume,
        };
        self.settlements.submit(intent, snapshot).await
    }

    /// Ledger rows whose day, in UTC, falls within `[start, end]` (`YYYY-MM-DD`)
    pub async fn transactions_between(
        &self,
        user_id: i64,
        start: &str,
        end: &str,
    ) -> LedgerResult<Vec<Transaction>> {
        let start = parse_day(start)?;
        let end = parse_day(end)?;
        if start > end {
            return Err(LedgerError::invalid(format!(
                "start date {} is after end date {}",
                start, end
            )));
        }

        let until = end
            .checked_add_days(Days::new(1))
            .ok_or_else(|| LedgerError::invalid(format!("end date {} is out of range", end)))?;

        self.store
            .transactions_between(user_id, start_of_day(start), start_of_day(until))
            .await
    }

    pub async fn settlement(&self, settlement_id: i64) -> LedgerResult<SettlementRecord> {
        self.store
            .find_settlement(settlement_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("settlement {}", settlement_id)))
    }

    pub async fn settlements_for_user(&self, user_id: i64) -> LedgerResult<Vec<SettlementRecord>> {
        self.store.settlements_for_user(user_id).await
    }
}

fn parse_day(raw: &str) -> LedgerResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| {
        LedgerError::invalid(format!("invalid date '{}' (expected YYYY-MM-DD): {}", raw, e))
    })
}

fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::settlement::{SettlementOutcome, SettlementStatus};
    use crate::infrastructure::memory_cache::MemoryCache;
    use crate::persistence::repository::SqliteLedgerStore;
    use crate::persistence::{init_database, DatabaseConfig};
    use std::time::Duration;

    async fn service() -> LedgerService {
        let pool = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        let store: Arc<dyn LedgerStore> = Arc::new(SqliteLedgerStore::new(pool));
        let cache = ReadThrough::new(Arc::new(MemoryCache::new(16)), Duration::from_secs(300));
        let tokens = Arc::new(TokenIssuer::new("test-secret-0123456789", Duration::from_secs(60)).unwrap());
        let worker = Arc::new(
            SettlementWorker::new(store.clone(), Duration::from_millis(5)).with_cache(cache.clone()),
        );
        LedgerService::new(store, cache, tokens, worker, 4)
    }

    fn signup(username: &str, balance: f64) -> Signup {
        Signup {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password: "hunter2".to_string(),
            balance,
        }
    }

    fn acme(low: f64, high: f64) -> NewStockSnapshot {
        NewStockSnapshot {
            ticker: "ACME".to_string(),
            open_price: low,
            close_price: high,
            high,
            low,
            volume: 100,
        }
    }

    fn order(ticker: &str, side: &str, volume: i64) -> TradeOrder {
        TradeOrder {
            user_id: None,
            ticker: ticker.to_string(),
            side: side.to_string(),
            volume,
        }
    }

    #[tokio::test]
    async fn test_signup_and_login() {
        let service = service().await;
        let profile = service.signup(signup("alice", 1000.0)).await.unwrap();
        assert_eq!(profile.balance, 1000.0);

        let token = service.login("alice", "hunter2").await.unwrap();
        assert_eq!(service.tokens.verify(&token).unwrap().user_id, profile.id);

        assert!(matches!(
            service.login("alice", "wrong").await,
            Err(LedgerError::Unauthorized(_))
        ));
        assert!(matches!(
            service.login("bob", "hunter2").await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_signup_validation() {
        let service = service().await;
        let mut no_password = signup("alice", 10.0);
        no_password.password.clear();
        assert!(matches!(
            service.signup(no_password).await,
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            service.signup(signup("alice", -5.0)).await,
            Err(LedgerError::InvalidInput(_))
        ));

        service.signup(signup("alice", 10.0)).await.unwrap();
        assert!(matches!(
            service.signup(signup("alice", 10.0)).await,
            Err(LedgerError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_ingest_refreshes_cached_listing() {
        let service = service().await;
        service.ingest_snapshot(acme(10.0, 12.0)).await.unwrap();
        assert_eq!(service.all_snapshots().await.unwrap().len(), 1);

        service.ingest_snapshot(acme(11.0, 13.0)).await.unwrap();
        assert_eq!(service.all_snapshots().await.unwrap().len(), 2);

        let newest_first = service.snapshots_for_ticker("ACME").await.unwrap();
        assert_eq!(newest_first[0].low, 11.0);
        assert!(matches!(
            service.snapshots_for_ticker("NOPE").await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_trade_settles_and_refreshes_profile() {
        let service = service().await;
        let user = service.signup(signup("alice", 1000.0)).await.unwrap();
        service.ingest_snapshot(acme(10.0, 12.0)).await.unwrap();

        // Warm the profile cache before the debit
        assert_eq!(service.user_profile("alice").await.unwrap().balance, 1000.0);

        let handle = service
            .submit_trade(user.id, order("ACME", "BUY", 50))
            .await
            .unwrap();
        let settlement_id = handle.settlement_id;
        assert!(matches!(
            handle.outcome().await.unwrap(),
            SettlementOutcome::Committed { balance, .. } if balance == 500.0
        ));

        assert_eq!(service.user_profile("alice").await.unwrap().balance, 500.0);
        assert_eq!(
            service.settlement(settlement_id).await.unwrap().status,
            SettlementStatus::Committed
        );
        assert_eq!(service.transactions_for_user(user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_rejects_bad_orders() {
        let service = service().await;
        let user = service.signup(signup("alice", 1000.0)).await.unwrap();
        service.ingest_snapshot(acme(10.0, 12.0)).await.unwrap();

        assert!(matches!(
            service.submit_trade(user.id, order("ACME", "hold", 1)).await,
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            service.submit_trade(user.id, order("ACME", "buy", 0)).await,
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            service.submit_trade(user.id, order("NOPE", "buy", 1)).await,
            Err(LedgerError::NotFound(_))
        ));

        let mut other = order("ACME", "buy", 1);
        other.user_id = Some(user.id + 1);
        assert!(matches!(
            service.submit_trade(user.id, other).await,
            Err(LedgerError::Unauthorized(_))
        ));
        assert!(service.settlements_for_user(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transactions_between_validates_dates() {
        let service = service().await;
        assert!(matches!(
            service.transactions_between(1, "2024-13-01", "2024-12-01").await,
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            service.transactions_between(1, "2024-02-01", "2024-01-01").await,
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(service
            .transactions_between(1, "2024-01-01", "2024-01-01")
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_day_bounds() {
        let day = parse_day("2024-03-09").unwrap();
        assert_eq!(start_of_day(day).to_rfc3339(), "2024-03-09T00:00:00+00:00");
    }
}
