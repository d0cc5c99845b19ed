//! Read-through caching over the ledger store

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::errors::LedgerResult;
use crate::domain::repositories::cache::Cache;

/// Key holding the serialized list of every snapshot
pub const ALL_STOCK_DATA_KEY: &str = "all_stock_data";

pub fn user_key(username: &str) -> String {
    format!("user:{}", username)
}

/// Serves values from the cache, falling back to a loader on a miss.
///
/// Cache failures are logged and otherwise ignored: a broken cache costs a
/// store read, never a wrong or missing answer.
///
/// Clones share an invalidation epoch. A load that overlaps any
/// `invalidate` drops its own write afterwards, so a value read before a
/// store change cannot outlive the invalidation that followed the change.
#[derive(Clone)]
pub struct ReadThrough {
    cache: Arc<dyn Cache>,
    ttl: Duration,
    epoch: Arc<AtomicU64>,
}

impl ReadThrough {
    pub fn new(cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self {
            cache,
            ttl,
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn get_or_load<T, F, Fut>(&self, key: &str, load: F) -> LedgerResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = LedgerResult<T>>,
    {
        let epoch = self.epoch.load(Ordering::SeqCst);

        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    tracing::debug!("Cache hit for {}", key);
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!("Discarding undecodable cache entry {}: {}", key, e);
                }
            },
            Ok(None) => tracing::debug!("Cache miss for {}", key),
            Err(e) => tracing::warn!("Cache read failed for {}: {}", key, e),
        }

        let value = load().await?;

        match serde_json::to_string(&value) {
            Ok(raw) => {
                if let Err(e) = self.cache.set(key, raw, self.ttl).await {
                    tracing::warn!("Cache write failed for {}: {}", key, e);
                } else if self.epoch.load(Ordering::SeqCst) != epoch {
                    tracing::debug!("Dropping {} loaded across an invalidation", key);
                    self.expire(key).await;
                }
            }
            Err(e) => tracing::warn!("Failed to serialize {} for caching: {}", key, e),
        }

        Ok(value)
    }

    /// Best-effort removal of `key`
    pub async fn invalidate(&self, key: &str) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.expire(key).await;
    }

    async fn expire(&self, key: &str) {
        if let Err(e) = self.cache.expire(key).await {
            tracing::warn!("Cache invalidation failed for {}: {}", key, e);
        }
    }
}
