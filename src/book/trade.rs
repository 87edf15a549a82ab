//! Trade records emitted by the matcher.

use super::order::Side;
use crate::types::{OrderId, TradeId};
use serde::{Deserialize, Serialize};

/// A single execution between a resting maker order and an incoming taker.
///
/// The trade price is always the maker's price; price improvement accrues to
/// the taker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Unique monotonic trade identifier.
    pub id: TradeId,
    /// Trading symbol.
    pub symbol: String,
    /// Execution price (the maker's limit price), `PRICE_SCALE`-scaled.
    pub price: i64,
    /// Executed quantity, `PRICE_SCALE`-scaled.
    pub qty: i64,
    /// The incoming (aggressive) order.
    pub taker_order_id: OrderId,
    /// The resting (passive) order.
    pub maker_order_id: OrderId,
    /// Side of the taker.
    pub taker_side: Side,
    /// Execution timestamp, nanoseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Aggregate outcome of matching one incoming order.
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    /// Trades generated, in execution order.
    pub trades: Vec<Trade>,
    /// Total quantity executed.
    pub filled_qty: i64,
    /// Quantity left unexecuted after the sweep.
    pub remaining_qty: i64,
    /// Whether the incoming order was filled completely.
    pub fully_filled: bool,
}

impl MatchResult {
    /// An empty result for an order of `qty` that matched nothing.
    pub fn unmatched(qty: i64) -> Self {
        Self {
            trades: Vec::new(),
            filled_qty: 0,
            remaining_qty: qty,
            fully_filled: false,
        }
    }
}
