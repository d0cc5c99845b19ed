//! Settlement lifecycle of a trade intent
//!
//! queued -> delayed -> priced -> balance_checked -> committed | rejected
//!
//! Any state may also end in `failed` when a dependency breaks mid-flight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::entities::transaction::{TradeSide, Transaction};
use crate::domain::errors::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Queued,
    Delayed,
    Priced,
    BalanceChecked,
    Committed,
    Rejected,
    Failed,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Queued => "queued",
            SettlementStatus::Delayed => "delayed",
            SettlementStatus::Priced => "priced",
            SettlementStatus::BalanceChecked => "balance_checked",
            SettlementStatus::Committed => "committed",
            SettlementStatus::Rejected => "rejected",
            SettlementStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SettlementStatus::Committed | SettlementStatus::Rejected | SettlementStatus::Failed
        )
    }
}

impl FromStr for SettlementStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(SettlementStatus::Queued),
            "delayed" => Ok(SettlementStatus::Delayed),
            "priced" => Ok(SettlementStatus::Priced),
            "balance_checked" => Ok(SettlementStatus::BalanceChecked),
            "committed" => Ok(SettlementStatus::Committed),
            "rejected" => Ok(SettlementStatus::Rejected),
            "failed" => Ok(SettlementStatus::Failed),
            other => Err(LedgerError::dependency(format!(
                "unknown settlement status in store: {}",
                other
            ))),
        }
    }
}

/// Persisted progress of one settlement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub id: i64,
    pub user_id: i64,
    pub ticker: String,
    pub side: TradeSide,
    pub volume: i64,
    pub price: Option<f64>,
    pub status: SettlementStatus,
    pub reason: Option<String>,
    pub transaction_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    InsufficientBalance { required: f64, available: f64 },
    UnknownUser,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::InsufficientBalance { .. } => "insufficient_balance",
            RejectReason::UnknownUser => "unknown_user",
        }
    }
}

/// Terminal result handed back through the settlement task's join handle
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    Committed {
        transaction: Transaction,
        balance: f64,
    },
    Rejected {
        reason: RejectReason,
        price: f64,
    },
    Failed {
        reason: String,
    },
}

impl SettlementOutcome {
    pub fn status(&self) -> SettlementStatus {
        match self {
            SettlementOutcome::Committed { .. } => SettlementStatus::Committed,
            SettlementOutcome::Rejected { .. } => SettlementStatus::Rejected,
            SettlementOutcome::Failed { .. } => SettlementStatus::Failed,
        }
    }
}
