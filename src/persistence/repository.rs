//! Database Repository
//!
//! SQLite implementation of the ledger store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error};

use super::models::*;
use super::DbPool;
use crate::domain::entities::settlement::{SettlementRecord, SettlementStatus};
use crate::domain::entities::stock::{NewStockSnapshot, StockSnapshot};
use crate::domain::entities::transaction::{TradeIntent, Transaction};
use crate::domain::entities::user::{NewUser, User};
use crate::domain::errors::{LedgerError, LedgerResult};
use crate::domain::repositories::ledger_store::{CommittedSettlement, LedgerStore};

/// Log a failed query and convert it into a ledger error
fn query_failed(context: &'static str) -> impl FnOnce(sqlx::Error) -> LedgerError {
    move |e| {
        error!("{}: {}", context, e);
        LedgerError::from(e)
    }
}

#[derive(Clone)]
pub struct SqliteLedgerStore {
    pool: DbPool,
}

impl SqliteLedgerStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn settlement_status(&self, id: i64) -> LedgerResult<Option<SettlementStatus>> {
        let status: Option<(String,)> =
            sqlx::query_as("SELECT status FROM settlements WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(query_failed("Failed to read settlement status"))?;

        status.map(|(s,)| s.parse()).transpose()
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn create_user(&self, user: NewUser) -> LedgerResult<User> {
        let now = Utc::now();
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (username, email, balance, password_hash, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            RETURNING *
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.balance)
        .bind(&user.password_hash)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match LedgerError::from(e) {
            LedgerError::Conflict(_) => {
                LedgerError::Conflict(format!("username {} already exists", user.username))
            }
            other => {
                error!("Failed to create user {}: {}", user.username, other);
                other
            }
        })?;

        debug!("Created user: {} ({})", record.username, record.id);
        Ok(record.into())
    }

    async fn find_user(&self, id: i64) -> LedgerResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed("Failed to get user"))?;

        Ok(record.map(User::from))
    }

    async fn find_user_by_username(&self, username: &str) -> LedgerResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE username = ?1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed("Failed to get user by username"))?;

        Ok(record.map(User::from))
    }

    async fn insert_snapshot(&self, snapshot: NewStockSnapshot) -> LedgerResult<StockSnapshot> {
        let record = sqlx::query_as::<_, StockSnapshotRecord>(
            r#"
            INSERT INTO stock_snapshots (ticker, open_price, close_price, high, low, volume, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING *
            "#,
        )
        .bind(&snapshot.ticker)
        .bind(snapshot.open_price)
        .bind(snapshot.close_price)
        .bind(snapshot.high)
        .bind(snapshot.low)
        .bind(snapshot.volume)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(query_failed("Failed to insert stock snapshot"))?;

        debug!("Ingested snapshot {} for {}", record.id, record.ticker);
        Ok(record.into())
    }

    async fn list_snapshots(&self) -> LedgerResult<Vec<StockSnapshot>> {
        let records = sqlx::query_as::<_, StockSnapshotRecord>(
            "SELECT * FROM stock_snapshots ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed("Failed to list stock snapshots"))?;

        Ok(records.into_iter().map(StockSnapshot::from).collect())
    }

    async fn snapshots_for_ticker(&self, ticker: &str) -> LedgerResult<Vec<StockSnapshot>> {
        let records = sqlx::query_as::<_, StockSnapshotRecord>(
            "SELECT * FROM stock_snapshots WHERE ticker = ?1 ORDER BY created_at DESC, id DESC",
        )
        .bind(ticker)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed("Failed to get snapshots for ticker"))?;

        Ok(records.into_iter().map(StockSnapshot::from).collect())
    }

    async fn latest_snapshot(&self, ticker: &str) -> LedgerResult<Option<StockSnapshot>> {
        let record = sqlx::query_as::<_, StockSnapshotRecord>(
            r#"
            SELECT * FROM stock_snapshots
            WHERE ticker = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed("Failed to get latest snapshot"))?;

        Ok(record.map(StockSnapshot::from))
    }

    async fn transactions_for_user(&self, user_id: i64) -> LedgerResult<Vec<Transaction>> {
        let records = sqlx::query_as::<_, TransactionRecord>(
            "SELECT * FROM transactions WHERE user_id = ?1 ORDER BY created_at ASC, id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed("Failed to get transactions for user"))?;

        convert_all(records)
    }

    async fn transactions_between(
        &self,
        user_id: i64,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> LedgerResult<Vec<Transaction>> {
        let records = sqlx::query_as::<_, TransactionRecord>(
            r#"
            SELECT * FROM transactions
            WHERE user_id = ?1 AND created_at >= ?2 AND created_at < ?3
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed("Failed to get transactions in range"))?;

        convert_all(records)
    }

    async fn open_settlement(&self, intent: &TradeIntent) -> LedgerResult<SettlementRecord> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, SettlementRow>(
            r#"
            INSERT INTO settlements (user_id, ticker, side, volume, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            RETURNING *
            "#,
        )
        .bind(intent.user_id)
        .bind(&intent.ticker)
        .bind(intent.side.as_str())
        .bind(intent.volume.value())
        .bind(SettlementStatus::Queued.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(query_failed("Failed to open settlement"))?;

        row.try_into()
    }

    async fn mark_settlement(
        &self,
        id: i64,
        status: SettlementStatus,
        price: Option<f64>,
        reason: Option<&str>,
    ) -> LedgerResult<()> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE settlements
            SET status = ?1, price = COALESCE(?2, price), reason = ?3, updated_at = ?4
            WHERE id = ?5 AND status NOT IN ('committed', 'rejected', 'failed')
            "#,
        )
        .bind(status.as_str())
        .bind(price)
        .bind(reason)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(query_failed("Failed to update settlement"))?
        .rows_affected();

        if rows_affected == 0 {
            return match self.settlement_status(id).await? {
                Some(current) => Err(LedgerError::Conflict(format!(
                    "settlement {} is already {}",
                    id,
                    current.as_str()
                ))),
                None => Err(LedgerError::not_found(format!("settlement {}", id))),
            };
        }

        debug!("Settlement {} -> {}", id, status.as_str());
        Ok(())
    }

    async fn commit_settlement(
        &self,
        settlement_id: i64,
        intent: &TradeIntent,
        price: f64,
    ) -> LedgerResult<CommittedSettlement> {
        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(query_failed("Failed to begin settlement transaction"))?;

        let debited = sqlx::query(
            r#"
            UPDATE users
            SET balance = balance - ?1, updated_at = ?2
            WHERE id = ?3 AND balance >= ?1
            "#,
        )
        .bind(price)
        .bind(now)
        .bind(intent.user_id)
        .execute(&mut *tx)
        .await
        .map_err(query_failed("Failed to debit balance"))?
        .rows_affected();

        if debited == 0 {
            let available: Option<(f64,)> =
                sqlx::query_as("SELECT balance FROM users WHERE id = ?1")
                    .bind(intent.user_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(query_failed("Failed to read balance"))?;
            tx.rollback()
                .await
                .map_err(query_failed("Failed to roll back settlement"))?;

            return Err(match available {
                Some((available,)) => LedgerError::InsufficientBalance {
                    required: price,
                    available,
                },
                None => LedgerError::not_found(format!("user {}", intent.user_id)),
            });
        }

        let transaction = sqlx::query_as::<_, TransactionRecord>(
            r#"
            INSERT INTO transactions (user_id, ticker, side, volume, price, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING *
            "#,
        )
        .bind(intent.user_id)
        .bind(&intent.ticker)
        .bind(intent.side.as_str())
        .bind(intent.volume.value())
        .bind(price)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(query_failed("Failed to record transaction"))?;

        let marked = sqlx::query(
            r#"
            UPDATE settlements
            SET status = 'committed', price = ?1, transaction_id = ?2, reason = NULL, updated_at = ?3
            WHERE id = ?4 AND status NOT IN ('committed', 'rejected', 'failed')
            "#,
        )
        .bind(price)
        .bind(transaction.id)
        .bind(now)
        .bind(settlement_id)
        .execute(&mut *tx)
        .await
        .map_err(query_failed("Failed to mark settlement committed"))?
        .rows_affected();

        if marked == 0 {
            tx.rollback()
                .await
                .map_err(query_failed("Failed to roll back settlement"))?;
            return Err(LedgerError::Conflict(format!(
                "settlement {} is missing or already terminal",
                settlement_id
            )));
        }

        let user = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE id = ?1")
            .bind(intent.user_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(query_failed("Failed to reload user"))?;

        tx.commit()
            .await
            .map_err(query_failed("Failed to commit settlement"))?;

        debug!(
            "Committed settlement {} as transaction {}",
            settlement_id, transaction.id
        );

        Ok(CommittedSettlement {
            transaction: transaction.try_into()?,
            user: user.into(),
        })
    }

    async fn find_settlement(&self, id: i64) -> LedgerResult<Option<SettlementRecord>> {
        let row = sqlx::query_as::<_, SettlementRow>("SELECT * FROM settlements WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed("Failed to get settlement"))?;

        row.map(SettlementRecord::try_from).transpose()
    }

    async fn settlements_for_user(&self, user_id: i64) -> LedgerResult<Vec<SettlementRecord>> {
        let rows = sqlx::query_as::<_, SettlementRow>(
            "SELECT * FROM settlements WHERE user_id = ?1 ORDER BY id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed("Failed to get settlements for user"))?;

        convert_all(rows)
    }

    async fn fail_unfinished_settlements(&self, reason: &str) -> LedgerResult<u64> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE settlements
            SET status = 'failed', reason = ?1, updated_at = ?2
            WHERE status NOT IN ('committed', 'rejected', 'failed')
            "#,
        )
        .bind(reason)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(query_failed("Failed to fail unfinished settlements"))?
        .rows_affected();

        debug!("Marked {} unfinished settlements failed", rows_affected);
        Ok(rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::transaction::TradeSide;
    use crate::domain::value_objects::volume::Volume;
    use crate::persistence::{init_database, DatabaseConfig};
    use chrono::Duration;

    async fn store() -> SqliteLedgerStore {
        let pool = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        SqliteLedgerStore::new(pool)
    }

    fn alice(balance: f64) -> NewUser {
        NewUser {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            balance,
            password_hash: "hash".to_string(),
        }
    }

    fn snapshot(ticker: &str, low: f64, high: f64) -> NewStockSnapshot {
        NewStockSnapshot {
            ticker: ticker.to_string(),
            open_price: low,
            close_price: high,
            high,
            low,
            volume: 500,
        }
    }

    fn buy(user_id: i64, volume: i64) -> TradeIntent {
        TradeIntent {
            user_id,
            ticker: "ACME".to_string(),
            side: TradeSide::Buy,
            volume: Volume::new(volume).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_create_and_find_user() {
        let store = store().await;
        let user = store.create_user(alice(1000.0)).await.unwrap();

        let by_id = store.find_user(user.id).await.unwrap().unwrap();
        let by_name = store.find_user_by_username("alice").await.unwrap().unwrap();
        assert_eq!(by_id, user);
        assert_eq!(by_name.balance, 1000.0);
        assert!(store.find_user(user.id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let store = store().await;
        store.create_user(alice(1.0)).await.unwrap();
        let err = store.create_user(alice(2.0)).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::Conflict("username alice already exists".to_string())
        );
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let store = store().await;
        let stored = store.insert_snapshot(snapshot("ACME", 10.0, 12.0)).await.unwrap();
        store.insert_snapshot(snapshot("OTHER", 1.0, 2.0)).await.unwrap();

        let for_ticker = store.snapshots_for_ticker("ACME").await.unwrap();
        assert_eq!(for_ticker, vec![stored.clone()]);
        assert_eq!(store.list_snapshots().await.unwrap().len(), 2);
        assert_eq!(store.latest_snapshot("ACME").await.unwrap(), Some(stored));
        assert!(store.latest_snapshot("NONE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_settlement_is_atomic() {
        let store = store().await;
        let user = store.create_user(alice(1000.0)).await.unwrap();
        let intent = buy(user.id, 50);
        let settlement = store.open_settlement(&intent).await.unwrap();
        assert_eq!(settlement.status, SettlementStatus::Queued);

        let committed = store
            .commit_settlement(settlement.id, &intent, 500.0)
            .await
            .unwrap();
        assert_eq!(committed.user.balance, 500.0);
        assert_eq!(committed.transaction.price, 500.0);
        assert_eq!(committed.transaction.user_id, Some(user.id));

        let record = store.find_settlement(settlement.id).await.unwrap().unwrap();
        assert_eq!(record.status, SettlementStatus::Committed);
        assert_eq!(record.transaction_id, Some(committed.transaction.id));
    }

    #[tokio::test]
    async fn test_commit_refuses_overdraft() {
        let store = store().await;
        let user = store.create_user(alice(100.0)).await.unwrap();
        let intent = buy(user.id, 50);
        let settlement = store.open_settlement(&intent).await.unwrap();

        let err = store
            .commit_settlement(settlement.id, &intent, 500.0)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientBalance {
                required: 500.0,
                available: 100.0
            }
        );
        assert_eq!(store.find_user(user.id).await.unwrap().unwrap().balance, 100.0);
        assert!(store.transactions_for_user(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_ledger_write_rolls_back_debit() {
        let store = store().await;
        let user = store.create_user(alice(1000.0)).await.unwrap();
        let intent = buy(user.id, 50);
        let settlement = store.open_settlement(&intent).await.unwrap();

        sqlx::query(
            "CREATE TRIGGER ledger_unavailable BEFORE INSERT ON transactions \
             BEGIN SELECT RAISE(ABORT, 'ledger unavailable'); END",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let err = store
            .commit_settlement(settlement.id, &intent, 500.0)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::DependencyFailure(_)));
        assert_eq!(store.find_user(user.id).await.unwrap().unwrap().balance, 1000.0);
    }

    #[tokio::test]
    async fn test_terminal_settlements_are_frozen() {
        let store = store().await;
        let intent = buy(1, 1);
        let settlement = store.open_settlement(&intent).await.unwrap();

        store
            .mark_settlement(settlement.id, SettlementStatus::Rejected, Some(10.0), Some("unknown_user"))
            .await
            .unwrap();
        let err = store
            .mark_settlement(settlement.id, SettlementStatus::Delayed, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));

        let missing = store
            .mark_settlement(9999, SettlementStatus::Delayed, None, None)
            .await
            .unwrap_err();
        assert!(matches!(missing, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fail_unfinished_settlements_spares_terminal_rows() {
        let store = store().await;
        let user = store.create_user(alice(1000.0)).await.unwrap();
        let intent = buy(user.id, 1);

        let queued = store.open_settlement(&intent).await.unwrap();
        let priced = store.open_settlement(&intent).await.unwrap();
        store
            .mark_settlement(priced.id, SettlementStatus::Priced, Some(10.0), None)
            .await
            .unwrap();
        let committed = store.open_settlement(&intent).await.unwrap();
        store
            .commit_settlement(committed.id, &intent, 10.0)
            .await
            .unwrap();
        let rejected = store.open_settlement(&intent).await.unwrap();
        store
            .mark_settlement(rejected.id, SettlementStatus::Rejected, Some(10.0), Some("unknown_user"))
            .await
            .unwrap();

        let changed = store.fail_unfinished_settlements("interrupted").await.unwrap();
        assert_eq!(changed, 2);

        for id in [queued.id, priced.id] {
            let record = store.find_settlement(id).await.unwrap().unwrap();
            assert_eq!(record.status, SettlementStatus::Failed);
            assert_eq!(record.reason.as_deref(), Some("interrupted"));
        }
        let record = store.find_settlement(priced.id).await.unwrap().unwrap();
        assert_eq!(record.price, Some(10.0));

        let record = store.find_settlement(committed.id).await.unwrap().unwrap();
        assert_eq!(record.status, SettlementStatus::Committed);
        let record = store.find_settlement(rejected.id).await.unwrap().unwrap();
        assert_eq!(record.reason.as_deref(), Some("unknown_user"));

        assert_eq!(store.fail_unfinished_settlements("interrupted").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transactions_between_bounds() {
        let store = store().await;
        let user = store.create_user(alice(1000.0)).await.unwrap();
        let intent = buy(user.id, 1);
        let settlement = store.open_settlement(&intent).await.unwrap();
        store
            .commit_settlement(settlement.id, &intent, 10.0)
            .await
            .unwrap();

        let now = Utc::now();
        let inside = store
            .transactions_between(user.id, now - Duration::hours(1), now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(inside.len(), 1);

        let before = store
            .transactions_between(user.id, now - Duration::days(2), now - Duration::days(1))
            .await
            .unwrap();
        assert!(before.is_empty());
    }

    #[tokio::test]
    async fn test_settlements_for_user_newest_first() {
        let store = store().await;
        let first = store.open_settlement(&buy(3, 1)).await.unwrap();
        let second = store.open_settlement(&buy(3, 2)).await.unwrap();
        store.open_settlement(&buy(4, 1)).await.unwrap();

        let ids: Vec<i64> = store
            .settlements_for_user(3)
            .await
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }
}
