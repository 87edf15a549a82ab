//! Shard router for the account engine.
//!
//! Commands route by `user_id % num_shards`; every command for one user
//! lands on the same single-writer shard, giving strict per-user FIFO.
//! `ApplyFill` is the only cross-shard operation: it issues one independent
//! idempotent transfer per side of the trade, keyed off the trade id, and
//! accepts at-least-once delivery. There is no two-phase commit; a leg that
//! fails after its sibling succeeded must be reconciled out-of-band.

use super::command::{Command, CommandKind, FillEvent};
use super::error::AccountError;
use super::shard::{AccountShard, ShardMessage};
use super::snapshot_store::{BalanceSnapshot, SnapshotStore};
use crate::config::AccountConfig;
use crate::types::{PRICE_SCALE, UserId, mul_div};
use crossbeam::channel::{Receiver, TrySendError, bounded};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;

/// Aggregated shard counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AccountStats {
    /// Commands applied successfully across every shard.
    pub applied: u64,
    /// Duplicate command ids refused.
    pub duplicates: u64,
    /// Commands refused by failed preconditions.
    pub rejected: u64,
}

/// The sharded hot-wallet account engine.
pub struct AccountEngine {
    shards: Vec<AccountShard>,
    store: Arc<SnapshotStore>,
    config: AccountConfig,
    closed: AtomicBool,
}

impl AccountEngine {
    /// Recovers every shard (when persistence is configured) and spawns the
    /// shard writer threads.
    ///
    /// # Errors
    /// Returns [`AccountError::Wal`] if any shard's on-disk state is
    /// damaged; the engine refuses to start.
    pub fn new(config: AccountConfig) -> Result<Self, AccountError> {
        let store = Arc::new(SnapshotStore::new());
        let mut shards = Vec::with_capacity(config.num_shards);
        for shard_id in 0..config.num_shards {
            let dir = config
                .wal_dir
                .as_ref()
                .map(|base| base.join(format!("shard-{shard_id}")));
            shards.push(AccountShard::spawn(
                shard_id,
                config.num_shards,
                config.command_queue_len,
                dir,
                Arc::clone(&store),
            )?);
        }
        info!("account engine started with {} shards", config.num_shards);
        Ok(Self {
            shards,
            store,
            config,
            closed: AtomicBool::new(false),
        })
    }

    #[inline]
    fn shard_for(&self, user_id: UserId) -> &AccountShard {
        &self.shards[(user_id % self.shards.len() as u64) as usize]
    }

    /// Submits a command and waits for its result up to the configured
    /// timeout.
    ///
    /// # Errors
    /// [`AccountError::QueueFull`] when the shard queue is saturated;
    /// [`AccountError::CommandTimeout`] when the wait expires; the command
    /// may still be applied, so retries must reuse the same `cmd_id`.
    pub fn submit(&self, command: Command) -> Result<(), AccountError> {
        let result_rx = self.submit_with_receiver(command)?;
        match result_rx.recv_timeout(Duration::from_millis(self.config.default_timeout_ms)) {
            Ok(result) => result,
            Err(_) => Err(AccountError::CommandTimeout),
        }
    }

    /// Submits a command without waiting for the outcome.
    pub fn submit_async(&self, command: Command) -> Result<(), AccountError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AccountError::Closed);
        }
        let shard = self.shard_for(command.user_id);
        match shard.tx.try_send(ShardMessage::Command {
            command,
            result_tx: None,
        }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(AccountError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(AccountError::Closed),
        }
    }

    fn submit_with_receiver(
        &self,
        command: Command,
    ) -> Result<Receiver<Result<(), AccountError>>, AccountError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AccountError::Closed);
        }
        let (result_tx, result_rx) = bounded(1);
        let shard = self.shard_for(command.user_id);
        match shard.tx.try_send(ShardMessage::Command {
            command,
            result_tx: Some(result_tx),
        }) {
            Ok(()) => Ok(result_rx),
            Err(TrySendError::Full(_)) => Err(AccountError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(AccountError::Closed),
        }
    }

    /// Reserves `amount` of `asset` against an order.
    pub fn reserve(
        &self,
        user_id: UserId,
        asset: &str,
        amount: i64,
        cmd_id: impl Into<String>,
    ) -> Result<(), AccountError> {
        self.submit(Command::reserve(cmd_id, user_id, asset, amount))
    }

    /// Releases previously reserved funds.
    pub fn release(
        &self,
        user_id: UserId,
        asset: &str,
        amount: i64,
        cmd_id: impl Into<String>,
    ) -> Result<(), AccountError> {
        self.submit(Command::release(cmd_id, user_id, asset, amount))
    }

    /// Credits or debits available funds directly. Positive `delta` adds,
    /// negative deducts.
    pub fn apply_balance_change(
        &self,
        user_id: UserId,
        asset: &str,
        delta: i64,
        cmd_id: impl Into<String>,
    ) -> Result<(), AccountError> {
        let command = if delta >= 0 {
            Command::add_balance(cmd_id, user_id, asset, delta)
        } else {
            Command::deduct_balance(cmd_id, user_id, asset, -delta)
        };
        self.submit(command)
    }

    /// Settles one trade: two independent idempotent transfer legs, one per
    /// shard. Duplicate delivery of the same `trade_id` is a no-op.
    ///
    /// The buyer leg moves locked quote into base; the seller leg moves
    /// locked base into quote. Each leg stays within its own user, so each
    /// executes wholly on one shard.
    ///
    /// # Errors
    /// Returns the first leg failure. A failed leg after a successful
    /// sibling leaves the books inconsistent until reconciliation runs.
    pub fn apply_fill(&self, fill: &FillEvent) -> Result<(), AccountError> {
        let quote_amount = mul_div(fill.qty, fill.price, PRICE_SCALE);

        let buyer_leg = Command {
            kind: CommandKind::Transfer,
            cmd_id: format!("fill_buyer_{}", fill.trade_id),
            user_id: fill.buyer,
            asset: fill.quote_asset.clone(),
            amount: quote_amount,
            to_user_id: fill.buyer,
            to_asset: fill.base_asset.clone(),
            to_amount: fill.qty,
            fee: fill.buyer_fee,
            fee_asset: fill.fee_asset.clone(),
        };
        let seller_leg = Command {
            kind: CommandKind::Transfer,
            cmd_id: format!("fill_seller_{}", fill.trade_id),
            user_id: fill.seller,
            asset: fill.base_asset.clone(),
            amount: fill.qty,
            to_user_id: fill.seller,
            to_asset: fill.quote_asset.clone(),
            to_amount: quote_amount,
            fee: fill.seller_fee,
            fee_asset: fill.fee_asset.clone(),
        };

        // Both legs run concurrently on their shards; wait for both.
        let buyer_rx = self.submit_with_receiver(buyer_leg)?;
        let seller_rx = self.submit_with_receiver(seller_leg)?;
        let timeout = Duration::from_millis(self.config.default_timeout_ms);

        let mut first_error = None;
        for rx in [buyer_rx, seller_rx] {
            let outcome = match rx.recv_timeout(timeout) {
                Ok(result) => result,
                Err(_) => Err(AccountError::CommandTimeout),
            };
            match outcome {
                Ok(()) => {}
                // Redelivery of an already-settled leg.
                Err(AccountError::DuplicateCommand(_)) => {}
                Err(e) => first_error = first_error.or(Some(e)),
            }
        }
        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// Lock-free read of a user's latest balance snapshot.
    pub fn get_snapshot(&self, user_id: UserId) -> Option<Arc<BalanceSnapshot>> {
        self.store.get(user_id)
    }

    /// The underlying snapshot store, for risk-side consumers.
    pub fn snapshot_store(&self) -> Arc<SnapshotStore> {
        Arc::clone(&self.store)
    }

    /// Pins or unpins a ledger against idle eviction.
    pub fn pin_user(&self, user_id: UserId, pinned: bool) -> Result<(), AccountError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AccountError::Closed);
        }
        self.shard_for(user_id)
            .tx
            .try_send(ShardMessage::Pin { user_id, pinned })
            .map_err(|_| AccountError::QueueFull)
    }

    /// Sweeps every shard for idle, flat, unpinned ledgers. Returns the
    /// total evicted.
    pub fn evict_idle(&self, max_idle: Duration) -> Result<usize, AccountError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AccountError::Closed);
        }
        let mut receivers = Vec::with_capacity(self.shards.len());
        for shard in &self.shards {
            let (result_tx, result_rx) = bounded(1);
            shard
                .tx
                .try_send(ShardMessage::EvictIdle {
                    max_idle_ms: max_idle.as_millis() as u64,
                    result_tx,
                })
                .map_err(|_| AccountError::QueueFull)?;
            receivers.push(result_rx);
        }
        let timeout = Duration::from_millis(self.config.default_timeout_ms);
        let mut total = 0usize;
        for rx in receivers {
            total += rx.recv_timeout(timeout).unwrap_or(0);
        }
        Ok(total)
    }

    /// Aggregated shard counters.
    pub fn stats(&self) -> AccountStats {
        let mut stats = AccountStats {
            applied: 0,
            duplicates: 0,
            rejected: 0,
        };
        for shard in &self.shards {
            stats.applied += shard.stats.applied.load(Ordering::Relaxed);
            stats.duplicates += shard.stats.duplicates.load(Ordering::Relaxed);
            stats.rejected += shard.stats.rejected.load(Ordering::Relaxed);
        }
        stats
    }

    /// Stops every shard, persisting snapshots and syncing WALs. Idempotent.
    pub fn stop(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for shard in &mut self.shards {
            shard.stop();
        }
        info!("account engine stopped");
    }
}

impl Drop for AccountEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
