use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used across the ledger core
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error taxonomy shared by the store, the settlement pipeline and the HTTP layer
#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum LedgerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Insufficient balance: required {required:.2}, available {available:.2}")]
    InsufficientBalance { required: f64, available: f64 },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Dependency failure: {0}")]
    DependencyFailure(String),
}

impl LedgerError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        LedgerError::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        LedgerError::NotFound(msg.into())
    }

    pub fn dependency(msg: impl Into<String>) -> Self {
        LedgerError::DependencyFailure(msg.into())
    }

    /// Short machine-readable kind, used in logs and persisted rejection reasons
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::InvalidInput(_) => "invalid_input",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::Conflict(_) => "conflict",
            LedgerError::InsufficientBalance { .. } => "insufficient_balance",
            LedgerError::Unauthorized(_) => "unauthorized",
            LedgerError::DependencyFailure(_) => "dependency_failure",
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => LedgerError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                LedgerError::Conflict(db.message().to_string())
            }
            _ => LedgerError::DependencyFailure(e.to_string()),
        }
    }
}
