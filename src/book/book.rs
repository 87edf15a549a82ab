//! Core OrderBook implementation: structural storage of resting orders and
//! publication of read snapshots.
//!
//! The book is strictly single-writer. Orders live in an arena keyed by
//! [`OrderId`]; price levels store ids only, so cancellation is an arena
//! lookup, a level removal, and an arena removal. An order is in the arena
//! iff it sits in exactly one price level's FIFO. External readers never see
//! the mutable structure; every structural change is followed by
//! [`update_snapshot`](OrderBook::update_snapshot), which publishes an
//! immutable [`BookSnapshot`] through an atomic pointer swap.

use super::error::BookError;
use super::ladder::Ladder;
use super::level::PriceLevel;
use super::order::{Order, OrderStatus, Side};
use super::snapshot::{BookSnapshot, DepthView, LevelSnapshot};
use crate::types::OrderId;
use crate::utils::current_time_nanos;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Number of levels per side included in published snapshots by default.
pub const DEFAULT_DEPTH_LEVELS: usize = 20;

/// A per-symbol limit order book.
pub struct OrderBook {
    /// The symbol this book trades.
    symbol: String,

    /// Bid side, iterated highest-price-first.
    pub(super) bids: Ladder,

    /// Ask side, iterated lowest-price-first.
    pub(super) asks: Ladder,

    /// Arena of live orders. Owns every resting order; levels refer to
    /// entries here by id.
    pub(super) orders: HashMap<OrderId, Order>,

    /// Levels per side copied into published snapshots.
    depth_levels: usize,

    /// Price of the most recent execution, zero before the first trade.
    pub(super) last_trade_price: i64,

    /// Published read-only snapshot. Swapped wholesale after each change.
    snapshot: Arc<ArcSwap<BookSnapshot>>,
}

impl OrderBook {
    /// Creates an empty book for `symbol` with the default snapshot depth.
    pub fn new(symbol: &str) -> Self {
        Self::with_depth(symbol, DEFAULT_DEPTH_LEVELS)
    }

    /// Creates an empty book including `depth_levels` levels per side in
    /// published snapshots.
    pub fn with_depth(symbol: &str, depth_levels: usize) -> Self {
        Self {
            symbol: symbol.to_string(),
            bids: Ladder::new(Side::Buy),
            asks: Ladder::new(Side::Sell),
            orders: HashMap::new(),
            depth_levels,
            last_trade_price: 0,
            snapshot: Arc::new(ArcSwap::from_pointee(BookSnapshot::empty(symbol))),
        }
    }

    /// The symbol this book trades.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// A cloneable read handle for snapshot consumers on other threads.
    pub fn depth_view(&self) -> DepthView {
        DepthView::new(Arc::clone(&self.snapshot))
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> Arc<BookSnapshot> {
        self.snapshot.load_full()
    }

    /// Inserts a resting order into the side-appropriate price level.
    ///
    /// # Errors
    /// Returns [`BookError::DuplicateOrderId`] if the id is already indexed.
    pub fn add(&mut self, mut order: Order) -> Result<(), BookError> {
        if self.orders.contains_key(&order.id) {
            return Err(BookError::DuplicateOrderId(order.id));
        }
        if order.filled_qty == 0 {
            order.status = OrderStatus::New;
        }
        let ladder = match order.side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        ladder
            .insert_or_get(order.price)
            .push_back(order.id, order.remaining());
        trace!(
            "resting order {} {} {}@{} on {}",
            order.id, order.side, order.qty, order.price, self.symbol
        );
        self.orders.insert(order.id, order);
        Ok(())
    }

    /// Cancels a resting order, deleting its price level if it empties.
    ///
    /// Returns the canceled order with status set to `Canceled`.
    ///
    /// # Errors
    /// Returns [`BookError::OrderNotFound`] if the id is not resting.
    pub fn cancel(&mut self, order_id: OrderId) -> Result<Order, BookError> {
        let mut order = self
            .orders
            .remove(&order_id)
            .ok_or(BookError::OrderNotFound(order_id))?;

        let ladder = match order.side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        if let Some(level) = ladder.get_mut(order.price) {
            level.remove_by_id(order_id, order.remaining());
            if level.is_empty() {
                ladder.remove(order.price);
            }
        }
        order.status = OrderStatus::Canceled;
        trace!("canceled order {} on {}", order_id, self.symbol);
        Ok(order)
    }

    /// Looks up a live order by id.
    pub fn get(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    /// Number of live orders in the arena.
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Number of non-empty price levels on each side as `(bids, asks)`.
    pub fn level_counts(&self) -> (usize, usize) {
        (self.bids.len(), self.asks.len())
    }

    /// Best bid price from the mutable structure. Writer-side only; readers
    /// use [`DepthView`].
    pub fn best_bid(&self) -> Option<i64> {
        self.bids.best()
    }

    /// Best ask price from the mutable structure. Writer-side only.
    pub fn best_ask(&self) -> Option<i64> {
        self.asks.best()
    }

    /// Rebuilds and atomically publishes the read snapshot.
    ///
    /// Called by the engine after every structural change; the previous
    /// snapshot stays valid for readers that already loaded it.
    pub fn update_snapshot(&self) {
        let snapshot = BookSnapshot {
            symbol: self.symbol.clone(),
            timestamp: current_time_nanos(),
            bids: self
                .bids
                .top_n(self.depth_levels)
                .into_iter()
                .map(|(price, qty)| LevelSnapshot { price, qty })
                .collect(),
            asks: self
                .asks
                .top_n(self.depth_levels)
                .into_iter()
                .map(|(price, qty)| LevelSnapshot { price, qty })
                .collect(),
            last_trade_price: self.last_trade_price,
        };
        self.snapshot.store(Arc::new(snapshot));
    }

    /// Iterates resting orders in price priority then FIFO arrival order,
    /// bids before asks. This is the canonical ordering used by checkpoints
    /// so that restoring re-creates identical FIFO queues.
    pub fn resting_orders(&self) -> impl Iterator<Item = &Order> + '_ {
        self.iter_side(&self.bids).chain(self.iter_side(&self.asks))
    }

    fn iter_side<'a>(&'a self, ladder: &'a Ladder) -> impl Iterator<Item = &'a Order> + 'a {
        ladder
            .iter_best_first()
            .flat_map(PriceLevel::iter)
            .filter_map(move |id| self.orders.get(&id))
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        // Every arena order is in exactly one level FIFO and vice versa.
        let mut seen = 0usize;
        for ladder in [&self.bids, &self.asks] {
            for level in ladder.iter_best_first() {
                let mut fifo_qty = 0i64;
                for id in level.iter() {
                    let order = self
                        .orders
                        .get(&id)
                        .unwrap_or_else(|| panic!("order {id} in level but not arena"));
                    assert_eq!(order.price, level.price());
                    fifo_qty += order.remaining();
                    seen += 1;
                }
                assert_eq!(level.total_qty(), fifo_qty, "level qty drift at {}", level.price());
                assert!(!level.is_empty(), "empty level left in ladder");
            }
        }
        assert_eq!(seen, self.orders.len(), "arena/level membership drift");
    }
}

impl std::fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBook")
            .field("symbol", &self.symbol)
            .field("orders", &self.orders.len())
            .field("bid_levels", &self.bids.len())
            .field("ask_levels", &self.asks.len())
            .finish()
    }
}
