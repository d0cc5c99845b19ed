//! Ledger Store Trait
//!
//! Transactional storage for users, stock snapshots, ledger entries and
//! settlement progress. The settlement pipeline depends only on this trait,
//! so it can run against SQLite in production and against wrappers in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::settlement::{SettlementRecord, SettlementStatus};
use crate::domain::entities::stock::{NewStockSnapshot, StockSnapshot};
use crate::domain::entities::transaction::{TradeIntent, Transaction};
use crate::domain::entities::user::{NewUser, User};
use crate::domain::errors::LedgerResult;

/// Result of a committed settlement: the ledger row and the debited user
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedSettlement {
    pub transaction: Transaction,
    pub user: User,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a user; a taken username is a `Conflict`
    async fn create_user(&self, user: NewUser) -> LedgerResult<User>;

    async fn find_user(&self, id: i64) -> LedgerResult<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> LedgerResult<Option<User>>;

    async fn insert_snapshot(&self, snapshot: NewStockSnapshot) -> LedgerResult<StockSnapshot>;

    async fn list_snapshots(&self) -> LedgerResult<Vec<StockSnapshot>>;

    /// All snapshots for a ticker, newest first
    async fn snapshots_for_ticker(&self, ticker: &str) -> LedgerResult<Vec<StockSnapshot>>;

    /// The most recently created snapshot for a ticker
    async fn latest_snapshot(&self, ticker: &str) -> LedgerResult<Option<StockSnapshot>>;

    async fn transactions_for_user(&self, user_id: i64) -> LedgerResult<Vec<Transaction>>;

    /// Ledger rows with `from <= created_at < until`
    async fn transactions_between(
        &self,
        user_id: i64,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> LedgerResult<Vec<Transaction>>;

    /// Persist a new settlement in the `queued` state
    async fn open_settlement(&self, intent: &TradeIntent) -> LedgerResult<SettlementRecord>;

    /// Record a non-committing transition (intermediate, rejected or failed)
    async fn mark_settlement(
        &self,
        id: i64,
        status: SettlementStatus,
        price: Option<f64>,
        reason: Option<&str>,
    ) -> LedgerResult<()>;

    /// Debit the user by `price`, append the ledger row and mark the
    /// settlement committed, all in one store transaction.
    ///
    /// Fails with `InsufficientBalance` (and changes nothing) if the balance
    /// no longer covers `price` when the debit is applied.
    async fn commit_settlement(
        &self,
        settlement_id: i64,
        intent: &TradeIntent,
        price: f64,
    ) -> LedgerResult<CommittedSettlement>;

    async fn find_settlement(&self, id: i64) -> LedgerResult<Option<SettlementRecord>>;

    async fn settlements_for_user(&self, user_id: i64) -> LedgerResult<Vec<SettlementRecord>>;

    /// Mark every settlement not yet in a terminal state as `failed` with
    /// `reason`. Returns the number of rows changed.
    async fn fail_unfinished_settlements(&self, reason: &str) -> LedgerResult<u64>;
}
