//! Order book depth snapshots for market data.
//!
//! The mutable book is owned by one matcher thread; everything outside it
//! reads depth through an immutable [`BookSnapshot`] published after each
//! structural change. [`SnapshotPackage`] wraps a snapshot with a version
//! and a SHA-256 checksum for export across process boundaries.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::trace;

use super::error::BookError;

/// One aggregated price level inside a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelSnapshot {
    /// Level price, `PRICE_SCALE`-scaled.
    pub price: i64,
    /// Sum of remaining quantity at this price.
    pub qty: i64,
}

/// A snapshot of the order book state at a specific point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshot {
    /// The symbol this order book trades.
    pub symbol: String,

    /// Timestamp when the snapshot was created (nanoseconds since epoch).
    pub timestamp: i64,

    /// Top-of-book and deeper bid levels, best (highest) first.
    pub bids: Vec<LevelSnapshot>,

    /// Top-of-book and deeper ask levels, best (lowest) first.
    pub asks: Vec<LevelSnapshot>,

    /// Price of the most recent trade, zero before the first execution.
    pub last_trade_price: i64,
}

impl BookSnapshot {
    /// An empty snapshot for a freshly created book.
    pub fn empty(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            timestamp: 0,
            bids: Vec::new(),
            asks: Vec::new(),
            last_trade_price: 0,
        }
    }

    /// Best bid price and quantity.
    pub fn best_bid(&self) -> Option<(i64, i64)> {
        let best = self.bids.first().map(|level| (level.price, level.qty));
        trace!("best_bid: {:?}", best);
        best
    }

    /// Best ask price and quantity.
    pub fn best_ask(&self) -> Option<(i64, i64)> {
        let best = self.asks.first().map(|level| (level.price, level.qty));
        trace!("best_ask: {:?}", best);
        best
    }

    /// Best ask minus best bid; `None` when either side is empty.
    pub fn spread(&self) -> Option<i64> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some(ask - bid),
            _ => None,
        }
    }

    /// Midpoint of the touch; `None` when either side is empty.
    pub fn mid_price(&self) -> Option<i64> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some((bid + ask) / 2),
            _ => None,
        }
    }

    /// Total quantity across the included bid levels.
    pub fn total_bid_qty(&self) -> i64 {
        self.bids.iter().map(|level| level.qty).sum()
    }

    /// Total quantity across the included ask levels.
    pub fn total_ask_qty(&self) -> i64 {
        self.asks.iter().map(|level| level.qty).sum()
    }
}

/// A cloneable read handle onto the book's atomically-published snapshot.
///
/// Readers never touch the mutable book structure; they load the current
/// `Arc<BookSnapshot>` and work with an immutable value.
#[derive(Clone)]
pub struct DepthView {
    inner: Arc<ArcSwap<BookSnapshot>>,
}

impl DepthView {
    pub(crate) fn new(inner: Arc<ArcSwap<BookSnapshot>>) -> Self {
        Self { inner }
    }

    /// Loads the most recently published snapshot.
    pub fn load(&self) -> Arc<BookSnapshot> {
        self.inner.load_full()
    }
}

impl std::fmt::Debug for DepthView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snap = self.inner.load();
        f.debug_struct("DepthView")
            .field("symbol", &snap.symbol)
            .field("bids", &snap.bids.len())
            .field("asks", &snap.asks.len())
            .finish()
    }
}

/// Format version used for checksum-enabled book snapshots.
pub const BOOK_SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Wrapper that provides checksum validation for [`BookSnapshot`] instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotPackage {
    /// Version of the snapshot schema for forward compatibility.
    pub version: u32,
    /// Snapshot payload.
    pub snapshot: BookSnapshot,
    /// Hex-encoded SHA-256 checksum of the serialized snapshot.
    pub checksum: String,
}

impl SnapshotPackage {
    /// Creates a new package, computing the checksum of the snapshot contents.
    pub fn new(snapshot: BookSnapshot) -> Result<Self, BookError> {
        let checksum = Self::compute_checksum(&snapshot)?;
        Ok(Self {
            version: BOOK_SNAPSHOT_FORMAT_VERSION,
            snapshot,
            checksum,
        })
    }

    /// Serializes the package to JSON.
    pub fn to_json(&self) -> Result<String, BookError> {
        serde_json::to_string(self).map_err(|error| BookError::SerializationError {
            message: error.to_string(),
        })
    }

    /// Deserializes the package from JSON.
    pub fn from_json(data: &str) -> Result<Self, BookError> {
        serde_json::from_str(data).map_err(|error| BookError::DeserializationError {
            message: error.to_string(),
        })
    }

    /// Validates the checksum and version.
    pub fn validate(&self) -> Result<(), BookError> {
        if self.version != BOOK_SNAPSHOT_FORMAT_VERSION {
            return Err(BookError::DeserializationError {
                message: format!(
                    "unsupported snapshot version: {} (expected {})",
                    self.version, BOOK_SNAPSHOT_FORMAT_VERSION
                ),
            });
        }

        let computed = Self::compute_checksum(&self.snapshot)?;
        if computed != self.checksum {
            return Err(BookError::ChecksumMismatch {
                expected: self.checksum.clone(),
                actual: computed,
            });
        }

        Ok(())
    }

    /// Consumes the package and returns the validated snapshot.
    pub fn into_snapshot(self) -> Result<BookSnapshot, BookError> {
        self.validate()?;
        Ok(self.snapshot)
    }

    fn compute_checksum(snapshot: &BookSnapshot) -> Result<String, BookError> {
        let payload =
            serde_json::to_vec(snapshot).map_err(|error| BookError::SerializationError {
                message: error.to_string(),
            })?;

        let mut hasher = Sha256::new();
        hasher.update(payload);
        Ok(format!("{:x}", hasher.finalize()))
    }
}
