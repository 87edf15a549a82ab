//! Configuration surface for the three engines.
//!
//! Plain serde-deserializable structs with defaults matching production
//! deployments; wiring them from files or flags happens outside this crate.

use crate::engine::SyncMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Per-symbol matching engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Symbol this engine matches, e.g. `BTC-USDT`.
    pub symbol: String,
    /// Capacity of the order and cancel submission queues.
    pub order_queue_size: usize,
    /// Capacity of the event fan-out queue.
    pub event_queue_size: usize,
    /// Directory holding `wal.log` and `checkpoint_<seq>.dat` files.
    pub wal_dir: PathBuf,
    /// WAL durability policy.
    pub sync_mode: SyncMode,
    /// Number of applied WAL entries between checkpoints.
    pub checkpoint_interval: u64,
    /// Levels per side included in published depth snapshots.
    pub depth_levels: usize,
}

impl EngineConfig {
    /// Configuration with production defaults for `symbol`, persisting
    /// under `wal_dir`.
    pub fn new(symbol: &str, wal_dir: impl Into<PathBuf>) -> Self {
        Self {
            symbol: symbol.to_string(),
            order_queue_size: 1024,
            event_queue_size: 4096,
            wal_dir: wal_dir.into(),
            sync_mode: SyncMode::Batch,
            checkpoint_interval: 10_000,
            depth_levels: crate::book::DEFAULT_DEPTH_LEVELS,
        }
    }
}

/// Account engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Number of single-writer shards; routing is `user_id % num_shards`.
    pub num_shards: usize,
    /// Capacity of each shard's command queue.
    pub command_queue_len: usize,
    /// How long a synchronous submit waits for its result, in milliseconds.
    pub default_timeout_ms: u64,
    /// Directory for per-shard WALs and snapshots; `None` disables
    /// persistence.
    pub wal_dir: Option<PathBuf>,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            num_shards: 8,
            command_queue_len: 1024,
            default_timeout_ms: 5_000,
            wal_dir: None,
        }
    }
}

/// Risk and liquidation engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Full-scan cadence in milliseconds.
    pub scan_interval_ms: u64,
    /// Parallel shards used by the full scan.
    pub num_shards: usize,
    /// Warning-tier checker cadence in milliseconds.
    pub warning_interval_ms: u64,
    /// Danger-tier checker cadence in milliseconds.
    pub danger_interval_ms: u64,
    /// Critical-tier checker cadence in milliseconds.
    pub critical_interval_ms: u64,
    /// Liquidation worker pool size.
    pub worker_count: usize,
    /// Capacity of the liquidation task queue.
    pub task_queue_size: usize,
    /// Per-task execution timeout in milliseconds.
    pub task_timeout_ms: u64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: 5_000,
            num_shards: 4,
            warning_interval_ms: 5_000,
            danger_interval_ms: 2_000,
            critical_interval_ms: 500,
            worker_count: 10,
            task_queue_size: 1024,
            task_timeout_ms: 30_000,
        }
    }
}
