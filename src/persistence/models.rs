//! Database Models
//!
//! Row shapes as stored, and their conversion into domain entities.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::domain::entities::settlement::SettlementRecord;
use crate::domain::entities::stock::StockSnapshot;
use crate::domain::entities::transaction::Transaction;
use crate::domain::entities::user::User;
use crate::domain::errors::LedgerError;

/// User row in database
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub balance: f64,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRecord> for User {
    fn from(r: UserRecord) -> Self {
        User {
            id: r.id,
            username: r.username,
            email: r.email,
            balance: r.balance,
            password_hash: r.password_hash,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Stock snapshot row in database
#[derive(Debug, Clone, FromRow)]
pub struct StockSnapshotRecord {
    pub id: i64,
    pub ticker: String,
    pub open_price: f64,
    pub close_price: f64,
    pub high: f64,
    pub low: f64,
    pub volume: i64,
    pub created_at: DateTime<Utc>,
}

impl From<StockSnapshotRecord> for StockSnapshot {
    fn from(r: StockSnapshotRecord) -> Self {
        StockSnapshot {
            id: r.id,
            ticker: r.ticker,
            open_price: r.open_price,
            close_price: r.close_price,
            high: r.high,
            low: r.low,
            volume: r.volume,
            created_at: r.created_at,
        }
    }
}

/// Ledger row in database
#[derive(Debug, Clone, FromRow)]
pub struct TransactionRecord {
    pub id: i64,
    pub user_id: Option<i64>,
    pub ticker: String,
    pub side: String, // "buy" or "sell"
    pub volume: i64,
    pub price: f64,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRecord> for Transaction {
    type Error = LedgerError;

    fn try_from(r: TransactionRecord) -> Result<Self, Self::Error> {
        Ok(Transaction {
            id: r.id,
            user_id: r.user_id,
            ticker: r.ticker,
            side: r.side.parse()?,
            volume: r.volume,
            price: r.price,
            created_at: r.created_at,
        })
    }
}

/// Settlement row in database
#[derive(Debug, Clone, FromRow)]
pub struct SettlementRow {
    pub id: i64,
    pub user_id: i64,
    pub ticker: String,
    pub side: String,
    pub volume: i64,
    pub price: Option<f64>,
    pub status: String,
    pub reason: Option<String>,
    pub transaction_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SettlementRow> for SettlementRecord {
    type Error = LedgerError;

    fn try_from(r: SettlementRow) -> Result<Self, Self::Error> {
        Ok(SettlementRecord {
            id: r.id,
            user_id: r.user_id,
            ticker: r.ticker,
            side: r.side.parse()?,
            volume: r.volume,
            price: r.price,
            status: r.status.parse()?,
            reason: r.reason,
            transaction_id: r.transaction_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// Convert a batch of rows, failing on the first corrupt one
pub fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, LedgerError>
where
    T: TryFrom<R, Error = LedgerError>,
{
    rows.into_iter().map(T::try_from).collect()
}
