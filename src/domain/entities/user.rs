//! User entity - the account whose balance settlement debits

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{LedgerError, LedgerResult};

/// Stored user, including the credential hash
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub balance: f64,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Public view of the user; this is what gets cached and returned to clients
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            balance: self.balance,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub balance: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Signup input once the password has been hashed
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub balance: f64,
    pub password_hash: String,
}

impl NewUser {
    pub fn validate(&self) -> LedgerResult<()> {
        if self.username.trim().is_empty() {
            return Err(LedgerError::invalid("username is required"));
        }
        if !self.balance.is_finite() || self.balance < 0.0 {
            return Err(LedgerError::invalid(
                "balance must be a finite, non-negative amount",
            ));
        }
        Ok(())
    }
}
