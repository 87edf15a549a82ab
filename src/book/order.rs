//! Order model: sides, order kinds, statuses, and the order record itself.

use crate::types::{OrderId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The side of an order or trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Bid side.
    Buy,
    /// Ask side.
    Sell,
}

impl Side {
    /// Returns the opposite side.
    #[inline]
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type, controlling post-match remainder handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    /// Rest the unfilled remainder in the book.
    Limit,
    /// Cross at any price; the remainder is canceled.
    Market,
    /// Immediate-or-cancel: like Limit for crossing, remainder canceled.
    Ioc,
    /// Fill-or-kill: rejected unless the full quantity can cross atomically.
    Fok,
    /// Rejected if any quantity would cross; otherwise rests.
    PostOnly,
    /// Good-till-cancel, treated as Limit by the matcher.
    Gtc,
}

impl OrderKind {
    /// Whether an unfilled remainder rests in the book after matching.
    #[inline]
    pub fn rests(&self) -> bool {
        matches!(self, OrderKind::Limit | OrderKind::Gtc | OrderKind::PostOnly)
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderKind::Limit => "LIMIT",
            OrderKind::Market => "MARKET",
            OrderKind::Ioc => "IOC",
            OrderKind::Fok => "FOK",
            OrderKind::PostOnly => "POST_ONLY",
            OrderKind::Gtc => "GTC",
        };
        write!(f, "{name}")
    }
}

/// Lifecycle status of an order.
///
/// Exactly one of `Filled`, `Canceled`, or `Rejected` is eventually reached
/// for every accepted order; none of the three ever transitions further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Accepted, nothing filled yet.
    New,
    /// Some quantity filled, remainder resting or in flight.
    PartiallyFilled,
    /// Fully filled and removed from the book.
    Filled,
    /// Canceled by the user or by remainder policy.
    Canceled,
    /// Refused before or during matching; never entered the book.
    Rejected,
}

impl OrderStatus {
    /// Whether this status is terminal.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected
        )
    }
}

/// A single order. Owned exclusively by the order book that indexes it;
/// everything outside the matcher thread sees orders only through snapshots
/// and events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Unique monotonic identifier.
    pub id: OrderId,
    /// Owning user.
    pub user_id: UserId,
    /// Trading symbol, e.g. `BTC-USDT`.
    pub symbol: String,
    /// Buy or Sell.
    pub side: Side,
    /// Order type.
    pub kind: OrderKind,
    /// Limit price, `PRICE_SCALE`-scaled. Zero for market orders.
    pub price: i64,
    /// Total quantity, `PRICE_SCALE`-scaled.
    pub qty: i64,
    /// Quantity filled so far. Invariant: `0 <= filled_qty <= qty`.
    pub filled_qty: i64,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Creation timestamp, nanoseconds since the Unix epoch.
    pub created_at: i64,
}

impl Order {
    /// Remaining unfilled quantity.
    #[inline]
    pub fn remaining(&self) -> i64 {
        self.qty - self.filled_qty
    }

    /// Records a fill of `qty` and advances the status.
    ///
    /// The caller guarantees `qty <= self.remaining()`; the matcher always
    /// fills `min(taker.remaining, maker.remaining)`.
    pub fn fill(&mut self, qty: i64) {
        debug_assert!(qty > 0 && qty <= self.remaining());
        self.filled_qty += qty;
        self.status = if self.filled_qty == self.qty {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
    }
}
