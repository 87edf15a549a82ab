//! Per-user ledgers: asset balances with an available/locked split.

use super::error::AccountError;
use crate::types::UserId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Balances of one asset for one user.
///
/// Invariant: `available >= 0` and `locked >= 0` at all times; every
/// mutation checks its precondition before touching either field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetBalance {
    /// Funds free for new orders and withdrawals.
    pub available: i64,
    /// Funds reserved against open orders.
    pub locked: i64,
}

impl AssetBalance {
    /// `available + locked`.
    #[inline]
    pub fn total(&self) -> i64 {
        self.available + self.locked
    }
}

/// One user's ledger inside an account shard.
///
/// Born lazily on first touch; survives eviction sweeps while pinned, while
/// any balance is non-zero, or while orders are open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserLedger {
    /// The owning user.
    pub user_id: UserId,
    /// Balances per asset.
    pub balances: HashMap<String, AssetBalance>,
    /// Idempotency record of applied command ids.
    pub applied_cmds: HashSet<String>,
    /// Open-order count, maintained by reserve/release.
    pub open_orders: u32,
    /// Last touch, milliseconds since the Unix epoch.
    pub last_active: u64,
    /// Pinned ledgers are never evicted.
    pub pinned: bool,
}

impl UserLedger {
    /// A fresh, empty ledger.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            balances: HashMap::new(),
            applied_cmds: HashSet::new(),
            open_orders: 0,
            last_active: 0,
            pinned: false,
        }
    }

    /// Balance of `asset`, zero if never touched.
    pub fn balance(&self, asset: &str) -> AssetBalance {
        self.balances.get(asset).copied().unwrap_or_default()
    }

    /// Moves `amount` from available to locked and counts an open order.
    ///
    /// # Errors
    /// [`AccountError::InsufficientBalance`] when available funds fall
    /// short; nothing changes in that case.
    pub fn reserve(&mut self, asset: &str, amount: i64) -> Result<(), AccountError> {
        if amount <= 0 {
            return Err(AccountError::InvalidAmount(amount));
        }
        let balance = self.balances.entry(asset.to_string()).or_default();
        if balance.available < amount {
            return Err(AccountError::InsufficientBalance {
                asset: asset.to_string(),
                needed: amount,
                available: balance.available,
            });
        }
        balance.available -= amount;
        balance.locked += amount;
        self.open_orders += 1;
        Ok(())
    }

    /// Inverse of [`reserve`](Self::reserve).
    ///
    /// # Errors
    /// [`AccountError::InsufficientLocked`] when locked funds fall short.
    pub fn release(&mut self, asset: &str, amount: i64) -> Result<(), AccountError> {
        if amount <= 0 {
            return Err(AccountError::InvalidAmount(amount));
        }
        let balance = self.balances.entry(asset.to_string()).or_default();
        if balance.locked < amount {
            return Err(AccountError::InsufficientLocked {
                asset: asset.to_string(),
                needed: amount,
                locked: balance.locked,
            });
        }
        balance.locked -= amount;
        balance.available += amount;
        self.open_orders = self.open_orders.saturating_sub(1);
        Ok(())
    }

    /// Credits `available` directly.
    pub fn credit_available(&mut self, asset: &str, amount: i64) -> Result<(), AccountError> {
        if amount <= 0 {
            return Err(AccountError::InvalidAmount(amount));
        }
        self.balances.entry(asset.to_string()).or_default().available += amount;
        Ok(())
    }

    /// Debits `available` directly.
    ///
    /// # Errors
    /// [`AccountError::InsufficientBalance`] when available funds fall
    /// short.
    pub fn debit_available(&mut self, asset: &str, amount: i64) -> Result<(), AccountError> {
        if amount <= 0 {
            return Err(AccountError::InvalidAmount(amount));
        }
        let balance = self.balances.entry(asset.to_string()).or_default();
        if balance.available < amount {
            return Err(AccountError::InsufficientBalance {
                asset: asset.to_string(),
                needed: amount,
                available: balance.available,
            });
        }
        balance.available -= amount;
        Ok(())
    }

    /// Debits `locked` directly (settlement of a filled order).
    ///
    /// # Errors
    /// [`AccountError::InsufficientLocked`] when locked funds fall short.
    pub fn debit_locked(&mut self, asset: &str, amount: i64) -> Result<(), AccountError> {
        if amount <= 0 {
            return Err(AccountError::InvalidAmount(amount));
        }
        let balance = self.balances.entry(asset.to_string()).or_default();
        if balance.locked < amount {
            return Err(AccountError::InsufficientLocked {
                asset: asset.to_string(),
                needed: amount,
                locked: balance.locked,
            });
        }
        balance.locked -= amount;
        Ok(())
    }

    /// Whether every balance is exactly zero.
    pub fn is_flat(&self) -> bool {
        self.balances
            .values()
            .all(|balance| balance.available == 0 && balance.locked == 0)
    }

    /// Whether an eviction sweep may drop this ledger.
    pub fn evictable(&self, now_ms: u64, max_idle_ms: u64) -> bool {
        !self.pinned
            && self.open_orders == 0
            && self.is_flat()
            && now_ms.saturating_sub(self.last_active) >= max_idle_ms
    }

    /// Refreshes the last-active timestamp.
    #[inline]
    pub fn touch(&mut self, now_ms: u64) {
        self.last_active = now_ms;
    }
}
