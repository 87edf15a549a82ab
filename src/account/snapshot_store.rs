//! Lock-free balance snapshot store.
//!
//! A single atomically-published pointer to an immutable map
//! `user_id -> Arc<BalanceSnapshot>`. Shard threads publish with
//! copy-on-write (clone the map, apply the change, compare-and-swap, retry
//! on contention); readers load the pointer and read with no
//! synchronization at all. Old maps are reclaimed by `Arc` refcount once
//! the last reader drops its handle.

use super::ledger::AssetBalance;
use crate::types::UserId;
use crate::utils::current_time_nanos;
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Immutable copy of one user's balances at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    /// The user this snapshot describes.
    pub user_id: UserId,
    /// Balances per asset.
    pub balances: HashMap<String, AssetBalance>,
    /// Monotonic publication sequence across the whole store.
    pub sequence: u64,
    /// Creation timestamp, nanoseconds since the Unix epoch.
    pub created_at: i64,
}

impl BalanceSnapshot {
    /// Balance of `asset`, zero if absent.
    pub fn balance(&self, asset: &str) -> AssetBalance {
        self.balances.get(asset).copied().unwrap_or_default()
    }
}

type SnapshotMap = HashMap<UserId, Arc<BalanceSnapshot>>;

/// The store itself. Cheap to clone-by-Arc and share across threads.
#[derive(Debug)]
pub struct SnapshotStore {
    map: ArcSwap<SnapshotMap>,
    sequence: AtomicU64,
}

impl SnapshotStore {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            map: ArcSwap::from_pointee(HashMap::new()),
            sequence: AtomicU64::new(1),
        }
    }

    /// Lock-free read of one user's latest snapshot.
    pub fn get(&self, user_id: UserId) -> Option<Arc<BalanceSnapshot>> {
        self.map.load().get(&user_id).cloned()
    }

    /// Lock-free read of the whole map as one consistent publication.
    pub fn all(&self) -> Arc<SnapshotMap> {
        self.map.load_full()
    }

    /// Number of users with a published snapshot.
    pub fn len(&self) -> usize {
        self.map.load().len()
    }

    /// Whether no snapshots are published.
    pub fn is_empty(&self) -> bool {
        self.map.load().is_empty()
    }

    /// Publishes a fresh snapshot for `user_id`, copy-on-write.
    ///
    /// Safe to call from any shard thread; concurrent publishers retry the
    /// swap until their change lands.
    pub fn publish(&self, user_id: UserId, balances: HashMap<String, AssetBalance>) {
        let snapshot = Arc::new(BalanceSnapshot {
            user_id,
            balances,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            created_at: current_time_nanos(),
        });
        self.map.rcu(|current| {
            let mut next = SnapshotMap::clone(current);
            next.insert(user_id, Arc::clone(&snapshot));
            next
        });
    }

    /// Removes a user's snapshot (ledger eviction).
    pub fn remove(&self, user_id: UserId) {
        self.map.rcu(|current| {
            let mut next = SnapshotMap::clone(current);
            next.remove(&user_id);
            next
        });
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
