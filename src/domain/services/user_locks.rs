//! Per-user mutual exclusion for balance mutation

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// One mutex per user id, created on first use.
///
/// Entries nobody holds or waits on are dropped whenever a new user is
/// added, so the map stays bounded by the users currently settling.
///
/// Holding the guard returned by [`UserLocks::lock`] is the only way the
/// settlement worker reads and debits a balance.
#[derive(Debug, Default, Clone)]
pub struct UserLocks {
    locks: Arc<RwLock<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `user_id`'s balance
    pub async fn lock(&self, user_id: i64) -> OwnedMutexGuard<()> {
        self.lock_for(user_id).await.lock_owned().await
    }

    async fn lock_for(&self, user_id: i64) -> Arc<Mutex<()>> {
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(&user_id) {
                return lock.clone();
            }
        }

        let mut locks = self.locks.write().await;
        if !locks.contains_key(&user_id) {
            // Only the map holds an idle lock: no guard, no waiter
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    #[cfg(test)]
    async fn tracked_users(&self) -> usize {
        self.locks.read().await.len()
    }
}
