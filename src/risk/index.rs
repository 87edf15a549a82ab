//! Tiered risk index with lock-free readers.
//!
//! Three copy-on-write maps, one per monitored tier (Warning, Danger,
//! Critical). Safe users are not stored (too many); Liquidate users are
//! not stored (they become tasks). A secondary map gives O(1) level lookup
//! by user id, and a `symbol -> users` reverse map feeds the price-trigger
//! fast path. All four maps are republished under one write mutex; read
//! paths just load the current publication.

use super::types::{RiskLevel, UserRiskData, classify};
use crate::types::UserId;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

type TierMap = HashMap<UserId, Arc<UserRiskData>>;
type LevelMap = HashMap<UserId, RiskLevel>;
type SymbolMap = HashMap<String, Vec<UserId>>;

/// Index of every user above the Safe threshold.
pub struct RiskTierIndex {
    /// Warning, Danger, Critical, in that order.
    tiers: [ArcSwap<TierMap>; 3],
    levels: ArcSwap<LevelMap>,
    by_symbol: ArcSwap<SymbolMap>,
    /// Serializes writers; readers never take it.
    write_lock: Mutex<()>,
}

/// Index slot for a monitored tier; `None` for Safe and Liquidate.
fn tier_slot(level: RiskLevel) -> Option<usize> {
    match level {
        RiskLevel::Warning => Some(0),
        RiskLevel::Danger => Some(1),
        RiskLevel::Critical => Some(2),
        RiskLevel::Safe | RiskLevel::Liquidate => None,
    }
}

impl RiskTierIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self {
            tiers: [
                ArcSwap::from_pointee(HashMap::new()),
                ArcSwap::from_pointee(HashMap::new()),
                ArcSwap::from_pointee(HashMap::new()),
            ],
            levels: ArcSwap::from_pointee(HashMap::new()),
            by_symbol: ArcSwap::from_pointee(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Lock-free: the user's current tier, `Safe` when untracked.
    pub fn level_of(&self, user_id: UserId) -> RiskLevel {
        self.levels
            .load()
            .get(&user_id)
            .copied()
            .unwrap_or(RiskLevel::Safe)
    }

    /// Lock-free: every entry in one monitored tier.
    pub fn users_in(&self, level: RiskLevel) -> Vec<Arc<UserRiskData>> {
        match tier_slot(level) {
            Some(slot) => self.tiers[slot].load().values().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Lock-free: monitored users holding positions in `symbol`.
    pub fn users_for_symbol(&self, symbol: &str) -> Vec<UserId> {
        self.by_symbol
            .load()
            .get(symbol)
            .cloned()
            .unwrap_or_default()
    }

    /// Lock-free: total users across the monitored tiers.
    pub fn monitored_count(&self) -> usize {
        self.tiers.iter().map(|tier| tier.load().len()).sum()
    }

    /// Re-evaluates one user, moving them between tiers as the ratio
    /// dictates. Safe and Liquidate both drop the user from the index.
    pub fn update_user(&self, mut data: UserRiskData) {
        let _guard = self.write_lock.lock();
        let new_level = classify(data.risk_ratio);
        data.level = new_level;
        let user_id = data.user_id;
        let old_level = self.levels.load().get(&user_id).copied();

        if let Some(old) = old_level
            && old != new_level
            && let Some(slot) = tier_slot(old)
        {
            self.tiers[slot].rcu(|current| {
                let mut next = TierMap::clone(current);
                next.remove(&user_id);
                next
            });
        }

        match tier_slot(new_level) {
            Some(slot) => {
                let entry = Arc::new(data);
                self.tiers[slot].rcu(|current| {
                    let mut next = TierMap::clone(current);
                    next.insert(user_id, Arc::clone(&entry));
                    next
                });
                self.levels.rcu(|current| {
                    let mut next = LevelMap::clone(current);
                    next.insert(user_id, new_level);
                    next
                });
            }
            None => {
                self.levels.rcu(|current| {
                    let mut next = LevelMap::clone(current);
                    next.remove(&user_id);
                    next
                });
            }
        }

        trace!("user {user_id} now {new_level}");
        self.rebuild_symbol_index_locked();
    }

    /// Drops a user from every tier (demoted to Safe or handed to the
    /// liquidation queue).
    pub fn remove_user(&self, user_id: UserId) {
        let _guard = self.write_lock.lock();
        if let Some(level) = self.levels.load().get(&user_id).copied()
            && let Some(slot) = tier_slot(level)
        {
            self.tiers[slot].rcu(|current| {
                let mut next = TierMap::clone(current);
                next.remove(&user_id);
                next
            });
        }
        self.levels.rcu(|current| {
            let mut next = LevelMap::clone(current);
            next.remove(&user_id);
            next
        });
        self.rebuild_symbol_index_locked();
    }

    /// Atomically replaces one tier's entire content. Used by the scanner
    /// to publish a whole scan's result per tier.
    pub fn batch_update_level(&self, level: RiskLevel, users: Vec<UserRiskData>) {
        let Some(slot) = tier_slot(level) else {
            return;
        };
        let _guard = self.write_lock.lock();

        let mut tier = TierMap::with_capacity(users.len());
        for mut data in users {
            data.level = level;
            tier.insert(data.user_id, Arc::new(data));
        }
        let old = self.tiers[slot].swap(Arc::new(tier));

        self.levels.rcu(|current| {
            let mut next = LevelMap::clone(current);
            // Drop level entries of users that left this tier...
            for user_id in old.keys() {
                if let Some(existing) = next.get(user_id)
                    && *existing == level
                {
                    next.remove(user_id);
                }
            }
            // ...then record the new membership.
            for user_id in self.tiers[slot].load().keys() {
                next.insert(*user_id, level);
            }
            next
        });

        self.rebuild_symbol_index_locked();
    }

    /// Rebuilds `symbol -> users` from the concatenation of all tiers.
    /// Caller must hold the write lock.
    fn rebuild_symbol_index_locked(&self) {
        let mut by_symbol: SymbolMap = HashMap::new();
        for tier in &self.tiers {
            for entry in tier.load().values() {
                for symbol in &entry.symbols {
                    by_symbol
                        .entry(symbol.clone())
                        .or_default()
                        .push(entry.user_id);
                }
            }
        }
        self.by_symbol.store(Arc::new(by_symbol));
    }
}

impl Default for RiskTierIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RiskTierIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskTierIndex")
            .field("warning", &self.tiers[0].load().len())
            .field("danger", &self.tiers[1].load().len())
            .field("critical", &self.tiers[2].load().len())
            .finish()
    }
}
