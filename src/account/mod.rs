//! Sharded hot-wallet account engine: single-writer ledgers, strict
//! idempotency, and lock-free balance snapshots.

mod command;
mod engine;
mod error;
mod ledger;
mod shard;
mod snapshot_store;

pub use command::{Command, CommandKind, FillEvent};
pub use engine::{AccountEngine, AccountStats};
pub use error::AccountError;
pub use ledger::{AssetBalance, UserLedger};
pub use shard::ShardStats;
pub use snapshot_store::{BalanceSnapshot, SnapshotStore};
