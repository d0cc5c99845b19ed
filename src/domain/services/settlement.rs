//! Settlement Worker
//!
//! Each accepted trade intent is settled on its own tokio task:
//!
//! 1. `queued`: the settlement row exists and the snapshot has been captured
//! 2. `delayed`: the task sleeps for the configured clearing delay
//! 3. `priced`: the price is computed from the captured snapshot, never a
//!    fresh one, so ticks during the delay do not move the price
//! 4. `balance_checked`: under the user's lock, the balance is re-read from
//!    the store and compared with the price
//! 5. `committed` (debit + ledger row + status in one store transaction) or
//!    `rejected`; a store failure anywhere ends in `failed`
//!
//! The per-user lock is held from the balance read until the commit returns,
//! so two settlements for the same user can never both pass the check
//! against a balance neither has debited yet.
//!
//! Settlement tasks are tracked so that shutdown can drain them. Rows left
//! unfinished by a process that died anyway are failed on the next start
//! by [`SettlementWorker::recover_interrupted`].

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::domain::entities::settlement::{RejectReason, SettlementOutcome, SettlementStatus};
use crate::domain::entities::stock::StockSnapshot;
use crate::domain::entities::transaction::TradeIntent;
use crate::domain::errors::{LedgerError, LedgerResult};
use crate::domain::repositories::ledger_store::LedgerStore;
use crate::domain::services::pricing::execution_price;
use crate::domain::services::read_through::{user_key, ReadThrough};
use crate::domain::services::user_locks::UserLocks;

/// Default artificial clearing latency
pub const DEFAULT_SETTLEMENT_DELAY: Duration = Duration::from_secs(10);

/// Reason recorded on settlements found unfinished at startup
pub const INTERRUPTED_REASON: &str = "interrupted";

/// A submitted settlement: its persisted id plus the task settling it
#[derive(Debug)]
pub struct SettlementHandle {
    pub settlement_id: i64,
    pub task: JoinHandle<SettlementOutcome>,
}

impl SettlementHandle {
    /// Wait for the terminal outcome
    pub async fn outcome(self) -> LedgerResult<SettlementOutcome> {
        self.task.await.map_err(|e| {
            LedgerError::dependency(format!(
                "settlement {} task did not complete: {}",
                self.settlement_id, e
            ))
        })
    }
}

pub struct SettlementWorker {
    store: Arc<dyn LedgerStore>,
    cache: Option<ReadThrough>,
    locks: UserLocks,
    delay: Duration,
    tasks: TaskTracker,
}

impl SettlementWorker {
    pub fn new(store: Arc<dyn LedgerStore>, delay: Duration) -> Self {
        Self {
            store,
            cache: None,
            locks: UserLocks::new(),
            delay,
            tasks: TaskTracker::new(),
        }
    }

    /// Expire the trading user's cached profile after each commit
    pub fn with_cache(mut self, cache: ReadThrough) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Fail every settlement a previous process left unfinished.
    ///
    /// Call once at startup, before any new intent is submitted.
    pub async fn recover_interrupted(&self) -> LedgerResult<u64> {
        let failed = self
            .store
            .fail_unfinished_settlements(INTERRUPTED_REASON)
            .await?;
        if failed > 0 {
            warn!(failed, "Failed settlements interrupted by a previous shutdown");
        }
        Ok(failed)
    }

    /// Stop accepting intents and wait for every in-flight settlement to
    /// reach a terminal state.
    pub async fn shutdown(&self) {
        self.tasks.close();
        info!(in_flight = self.tasks.len(), "Draining settlements");
        self.tasks.wait().await;
        info!("Settlements drained");
    }

    /// Persist the intent as `queued` and spawn its settlement task.
    ///
    /// Returns as soon as the row exists; the caller never waits for the
    /// delay. Once spawned the task always reaches a terminal state.
    pub async fn submit(
        self: &Arc<Self>,
        intent: TradeIntent,
        snapshot: StockSnapshot,
    ) -> LedgerResult<SettlementHandle> {
        if self.tasks.is_closed() {
            return Err(LedgerError::dependency("settlement worker is shutting down"));
        }
        let record = self.store.open_settlement(&intent).await?;
        let settlement_id = record.id;

        info!(
            settlement_id,
            user_id = intent.user_id,
            ticker = %intent.ticker,
            side = %intent.side,
            volume = intent.volume.value(),
            "Settlement queued"
        );

        let worker = Arc::clone(self);
        let task = self
            .tasks
            .spawn(async move { worker.settle(settlement_id, intent, snapshot).await });

        Ok(SettlementHandle {
            settlement_id,
            task,
        })
    }

    async fn settle(
        &self,
        settlement_id: i64,
        intent: TradeIntent,
        snapshot: StockSnapshot,
    ) -> SettlementOutcome {
        match self.run(settlement_id, &intent, &snapshot).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    settlement_id,
                    user_id = intent.user_id,
                    "Settlement failed: {}",
                    e
                );
                let reason = e.to_string();
                if let Err(mark_err) = self
                    .store
                    .mark_settlement(settlement_id, SettlementStatus::Failed, None, Some(&reason))
                    .await
                {
                    error!(
                        settlement_id,
                        "Could not record failed settlement: {}", mark_err
                    );
                }
                SettlementOutcome::Failed { reason }
            }
        }
    }

    async fn run(
        &self,
        settlement_id: i64,
        intent: &TradeIntent,
        snapshot: &StockSnapshot,
    ) -> LedgerResult<SettlementOutcome> {
        self.transition(settlement_id, SettlementStatus::Delayed, None)
            .await;
        tokio::time::sleep(self.delay).await;

        let price = execution_price(snapshot, intent.side, intent.volume)?.value();
        self.transition(settlement_id, SettlementStatus::Priced, Some(price))
            .await;

        let _guard = self.locks.lock(intent.user_id).await;
        debug!(settlement_id, user_id = intent.user_id, "Acquired user lock");

        let user = match self.store.find_user(intent.user_id).await? {
            Some(user) => user,
            None => {
                return self
                    .reject(settlement_id, intent, price, RejectReason::UnknownUser)
                    .await
            }
        };
        self.transition(settlement_id, SettlementStatus::BalanceChecked, Some(price))
            .await;

        if user.balance < price {
            let reason = RejectReason::InsufficientBalance {
                required: price,
                available: user.balance,
            };
            return self.reject(settlement_id, intent, price, reason).await;
        }

        match self
            .store
            .commit_settlement(settlement_id, intent, price)
            .await
        {
            Ok(committed) => {
                info!(
                    settlement_id,
                    user_id = intent.user_id,
                    transaction_id = committed.transaction.id,
                    price,
                    balance = committed.user.balance,
                    "Settlement committed"
                );
                if let Some(cache) = &self.cache {
                    cache.invalidate(&user_key(&committed.user.username)).await;
                }
                Ok(SettlementOutcome::Committed {
                    transaction: committed.transaction,
                    balance: committed.user.balance,
                })
            }
            Err(LedgerError::InsufficientBalance {
                required,
                available,
            }) => {
                let reason = RejectReason::InsufficientBalance {
                    required,
                    available,
                };
                self.reject(settlement_id, intent, price, reason).await
            }
            Err(e) => Err(e),
        }
    }

    async fn reject(
        &self,
        settlement_id: i64,
        intent: &TradeIntent,
        price: f64,
        reason: RejectReason,
    ) -> LedgerResult<SettlementOutcome> {
        warn!(
            settlement_id,
            user_id = intent.user_id,
            ticker = %intent.ticker,
            price,
            "Settlement rejected: {}",
            reason.code()
        );
        self.store
            .mark_settlement(
                settlement_id,
                SettlementStatus::Rejected,
                Some(price),
                Some(reason.code()),
            )
            .await?;
        Ok(SettlementOutcome::Rejected { reason, price })
    }

    /// Record a non-terminal step. Progress markers are informational, so a
    /// failed write is logged and the settlement carries on.
    async fn transition(&self, settlement_id: i64, status: SettlementStatus, price: Option<f64>) {
        debug!(settlement_id, status = status.as_str(), "Settlement transition");
        if let Err(e) = self
            .store
            .mark_settlement(settlement_id, status, price, None)
            .await
        {
            warn!(
                settlement_id,
                "Could not record {} transition: {}",
                status.as_str(),
                e
            );
        }
    }
}
