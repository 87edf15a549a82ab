//! Price-time-priority matching and order-type post-processing.
//!
//! The matcher sweeps the opposite ladder best-price-first, filling against
//! each level's FIFO head. Trades execute at the maker's price. Order-type
//! handling wraps the sweep: FOK pre-scans crossing depth and rejects
//! atomically before any mutation, post-only rejects on any potential cross,
//! market and IOC remainders are canceled, limit and GTC remainders rest.

use super::book::OrderBook;
use super::error::BookError;
use super::order::{Order, OrderKind, OrderStatus, Side};
use super::trade::{MatchResult, Trade};
use crate::types::{IdSequence, TradeId};
use tracing::trace;

/// Outcome of submitting one order through the matcher.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// The order in its post-execution state.
    pub order: Order,
    /// Trades generated by the sweep.
    pub result: MatchResult,
    /// Whether an unfilled remainder was left resting in the book.
    pub rested: bool,
}

impl OrderBook {
    /// Runs an incoming order through matching and order-type
    /// post-processing, mutating the book.
    ///
    /// Business rejections (FOK shortfall, post-only cross) come back as
    /// `Ok` with `order.status == Rejected`; only validation failures are
    /// `Err`.
    ///
    /// # Errors
    /// Returns [`BookError::InvalidQty`], [`BookError::InvalidPrice`], or
    /// [`BookError::DuplicateOrderId`] without touching the book.
    pub fn execute(
        &mut self,
        mut taker: Order,
        trade_ids: &IdSequence,
        now_ns: i64,
    ) -> Result<ExecutionReport, BookError> {
        if taker.qty <= 0 || taker.filled_qty != 0 {
            return Err(BookError::InvalidQty { qty: taker.qty });
        }
        if taker.kind != OrderKind::Market && taker.price <= 0 {
            return Err(BookError::InvalidPrice { price: taker.price });
        }
        if self.get(taker.id).is_some() {
            return Err(BookError::DuplicateOrderId(taker.id));
        }

        match taker.kind {
            OrderKind::Fok => {
                let available = self.peek_match(taker.side, taker.qty, Some(taker.price));
                if available < taker.qty {
                    trace!(
                        "rejecting FOK {}: crossing depth {} < {}",
                        taker.id, available, taker.qty
                    );
                    taker.status = OrderStatus::Rejected;
                    return Ok(ExecutionReport {
                        result: MatchResult::unmatched(taker.qty),
                        order: taker,
                        rested: false,
                    });
                }
            }
            OrderKind::PostOnly => {
                if let Some(opposite_price) = self.crossing_price(taker.side, taker.price) {
                    trace!(
                        "rejecting post-only {}: would cross {} at {}",
                        taker.id, taker.side, opposite_price
                    );
                    taker.status = OrderStatus::Rejected;
                    return Ok(ExecutionReport {
                        result: MatchResult::unmatched(taker.qty),
                        order: taker,
                        rested: false,
                    });
                }
            }
            _ => {}
        }

        let result = if taker.kind == OrderKind::PostOnly {
            MatchResult::unmatched(taker.qty)
        } else {
            self.match_order(&mut taker, trade_ids, now_ns)
        };

        let mut rested = false;
        if taker.remaining() > 0 {
            if taker.kind.rests() {
                self.add(taker.clone())?;
                rested = true;
            } else {
                // Market and IOC remainders die here.
                taker.status = OrderStatus::Canceled;
            }
        }

        Ok(ExecutionReport {
            order: taker,
            result,
            rested,
        })
    }

    /// Sweeps the opposite side, filling `taker` against resting orders in
    /// price-time priority. Fully-filled makers are popped from their FIFO
    /// and removed from the arena; emptied levels are deleted.
    pub fn match_order(
        &mut self,
        taker: &mut Order,
        trade_ids: &IdSequence,
        now_ns: i64,
    ) -> MatchResult {
        let mut result = MatchResult::unmatched(taker.remaining());
        let symbol = self.symbol().to_string();

        let OrderBook {
            bids,
            asks,
            orders,
            last_trade_price,
            ..
        } = self;
        let opposite = match taker.side {
            Side::Buy => asks,
            Side::Sell => bids,
        };

        while taker.remaining() > 0 {
            let Some(best_price) = opposite.best() else {
                break;
            };
            if !crosses(taker, best_price) {
                break;
            }
            let Some(level) = opposite.get_mut(best_price) else {
                break;
            };

            while taker.remaining() > 0 {
                let Some(maker_id) = level.front() else {
                    break;
                };
                let Some(maker) = orders.get_mut(&maker_id) else {
                    level.pop_front();
                    continue;
                };

                let match_qty = taker.remaining().min(maker.remaining());
                maker.fill(match_qty);
                taker.fill(match_qty);
                level.reduce(match_qty);
                *last_trade_price = best_price;

                result.trades.push(Trade {
                    id: TradeId(trade_ids.next()),
                    symbol: symbol.clone(),
                    price: best_price,
                    qty: match_qty,
                    taker_order_id: taker.id,
                    maker_order_id: maker_id,
                    taker_side: taker.side,
                    timestamp: now_ns,
                });
                result.filled_qty += match_qty;

                if maker.status == OrderStatus::Filled {
                    level.pop_front();
                    orders.remove(&maker_id);
                }
            }

            if level.is_empty() {
                opposite.remove(best_price);
            }
        }

        result.remaining_qty = taker.remaining();
        result.fully_filled = result.remaining_qty == 0;
        trace!(
            "matched {}: filled {} remaining {} in {} trades",
            taker.id,
            result.filled_qty,
            result.remaining_qty,
            result.trades.len()
        );
        result
    }

    /// Quantity available on the opposite side at prices that cross
    /// `limit`, without mutating anything. `None` sweeps every level
    /// (market semantics).
    pub fn peek_match(&self, side: Side, qty: i64, limit: Option<i64>) -> i64 {
        let opposite = match side {
            Side::Buy => &self.asks,
            Side::Sell => &self.bids,
        };

        let mut matched = 0i64;
        for level in opposite.iter_best_first() {
            if matched >= qty {
                break;
            }
            if let Some(limit) = limit {
                match side {
                    Side::Buy if level.price() > limit => break,
                    Side::Sell if level.price() < limit => break,
                    _ => {}
                }
            }
            matched += level.total_qty();
        }
        matched.min(qty)
    }

    /// The best opposite price that `price` would cross, if any.
    fn crossing_price(&self, side: Side, price: i64) -> Option<i64> {
        match side {
            Side::Buy => self.asks.best().filter(|&ask| price >= ask),
            Side::Sell => self.bids.best().filter(|&bid| price <= bid),
        }
    }
}

/// Crossing rule: market orders always cross; a buy limit crosses when its
/// price is at or above the maker's, a sell limit at or below.
#[inline]
fn crosses(taker: &Order, maker_price: i64) -> bool {
    if taker.kind == OrderKind::Market {
        return true;
    }
    match taker.side {
        Side::Buy => taker.price >= maker_price,
        Side::Sell => taker.price <= maker_price,
    }
}
