//! Monotonic 64-bit identifiers for orders and trades.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// User identifier. Plain `u64` so shard routing (`user_id % N`) stays a
/// single instruction.
pub type UserId = u64;

/// Unique, monotonically increasing order identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique, monotonically increasing trade identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TradeId(pub u64);

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A lock-free monotonic sequence for id generation.
///
/// One instance per id space (order ids, trade ids, WAL sequences). The
/// counter can be fast-forwarded during recovery so that ids issued after a
/// restart never collide with ids already on disk.
#[derive(Debug)]
pub struct IdSequence {
    next: AtomicU64,
}

impl IdSequence {
    /// Creates a sequence whose first issued value is `start`.
    pub fn new(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    /// Issues the next value.
    #[inline]
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the value the next call to [`next`](Self::next) would issue.
    #[inline]
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }

    /// Fast-forwards the sequence so the next issued value is strictly
    /// greater than `seen`. Used when rebuilding state from a checkpoint.
    pub fn advance_past(&self, seen: u64) {
        let mut current = self.next.load(Ordering::Relaxed);
        while current <= seen {
            match self.next.compare_exchange_weak(
                current,
                seen + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }
}

impl Default for IdSequence {
    fn default() -> Self {
        Self::new(1)
    }
}
