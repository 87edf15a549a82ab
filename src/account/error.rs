//! Account engine error types.

use crate::types::UserId;
use thiserror::Error;

/// Errors surfaced by account shards and the shard router.
///
/// Invariant violations report the precondition that failed and leave state
/// untouched; capacity and timeout errors describe delivery, not execution:
/// after [`CommandTimeout`](AccountError::CommandTimeout) the command may
/// still be applied, and callers must lean on idempotency keys.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum AccountError {
    #[error("insufficient balance of {asset}: need {needed}, available {available}")]
    InsufficientBalance {
        asset: String,
        needed: i64,
        available: i64,
    },

    #[error("insufficient locked {asset}: need {needed}, locked {locked}")]
    InsufficientLocked {
        asset: String,
        needed: i64,
        locked: i64,
    },

    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("duplicate command {0}")]
    DuplicateCommand(String),

    #[error("amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("transfer receiver {receiver} lives on shard {receiver_shard}, not {shard}")]
    CrossShardReceiver {
        receiver: UserId,
        receiver_shard: usize,
        shard: usize,
    },

    #[error("command queue full")]
    QueueFull,

    #[error("command timed out; it may still be applied")]
    CommandTimeout,

    #[error("account engine is closed")]
    Closed,

    #[error("account wal failure: {0}")]
    Wal(String),
}
