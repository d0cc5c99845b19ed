//! In-process TTL cache
//!
//! Bounded by an LRU so a flood of distinct usernames cannot grow memory
//! without limit; entries also expire individually after their TTL.

use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::domain::errors::{LedgerError, LedgerResult};
use crate::domain::repositories::cache::Cache;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

pub struct MemoryCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl MemoryCache {
    /// A capacity of zero is bumped to one
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> LedgerResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
            tracing::debug!("Cache entry {} expired", key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> LedgerResult<()> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| LedgerError::invalid(format!("cache ttl {:?} is out of range", ttl)))?;
        let entry = CacheEntry { value, expires_at };
        self.entries.lock().await.put(key.to_string(), entry);
        Ok(())
    }

    async fn expire(&self, key: &str) -> LedgerResult<()> {
        self.entries.lock().await.pop(key);
        Ok(())
    }
}
