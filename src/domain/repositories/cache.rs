//! Cache Trait
//!
//! Key/value contract for the read-through cache. Values are serialized
//! records; the cache is an optimisation only and never a source of truth.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::errors::LedgerResult;

#[async_trait]
pub trait Cache: Send + Sync {
    /// Cached value for `key`, or `None` on a miss or an expired entry
    async fn get(&self, key: &str) -> LedgerResult<Option<String>>;

    /// Store `value` under `key`, expiring after `ttl`
    async fn set(&self, key: &str, value: String, ttl: Duration) -> LedgerResult<()>;

    /// Drop `key` immediately
    async fn expire(&self, key: &str) -> LedgerResult<()>;
}
