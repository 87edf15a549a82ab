//! Property tests for the structural invariants.

use exchange_core::{
    AssetBalance, IdSequence, Order, OrderBook, OrderId, OrderKind, OrderStatus, Side, UserLedger,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum BookOp {
    Limit { side: Side, price: i64, qty: i64 },
    Market { side: Side, qty: i64 },
    Cancel { slot: usize },
}

fn book_op() -> impl Strategy<Value = BookOp> {
    prop_oneof![
        (any::<bool>(), 95..=105i64, 1..=20i64).prop_map(|(buy, price, qty)| BookOp::Limit {
            side: if buy { Side::Buy } else { Side::Sell },
            price,
            qty,
        }),
        (any::<bool>(), 1..=30i64).prop_map(|(buy, qty)| BookOp::Market {
            side: if buy { Side::Buy } else { Side::Sell },
            qty,
        }),
        (0..64usize).prop_map(|slot| BookOp::Cancel { slot }),
    ]
}

fn order(id: u64, side: Side, kind: OrderKind, price: i64, qty: i64) -> Order {
    Order {
        id: OrderId(id),
        user_id: 1,
        symbol: "BTC-USDT".to_string(),
        side,
        kind,
        price,
        qty,
        filled_qty: 0,
        status: OrderStatus::New,
        created_at: 0,
    }
}

proptest! {
    /// No phantom quantity: everything submitted is accounted for as
    /// matched (twice, once per side), canceled, or still resting, and
    /// the book never ends up crossed.
    #[test]
    fn prop_book_conserves_quantity(ops in proptest::collection::vec(book_op(), 1..80)) {
        let mut book = OrderBook::with_depth("BTC-USDT", 1_000);
        let trade_ids = IdSequence::new(1);
        let mut next_id = 1u64;
        let mut submitted_ids: Vec<OrderId> = Vec::new();

        let mut submitted_qty = 0i64;
        let mut matched_qty = 0i64;
        let mut canceled_qty = 0i64;

        for op in ops {
            match op {
                BookOp::Limit { side, price, qty } => {
                    let id = next_id;
                    next_id += 1;
                    submitted_qty += qty;
                    let report = book
                        .execute(order(id, side, OrderKind::Limit, price, qty), &trade_ids, 0)
                        .unwrap_or_else(|e| panic!("execute: {e}"));
                    matched_qty += report.result.filled_qty;
                    if report.rested {
                        submitted_ids.push(report.order.id);
                    }
                }
                BookOp::Market { side, qty } => {
                    let id = next_id;
                    next_id += 1;
                    submitted_qty += qty;
                    let report = book
                        .execute(order(id, side, OrderKind::Market, 0, qty), &trade_ids, 0)
                        .unwrap_or_else(|e| panic!("execute: {e}"));
                    matched_qty += report.result.filled_qty;
                    if report.order.status == OrderStatus::Canceled {
                        canceled_qty += report.result.remaining_qty;
                    }
                }
                BookOp::Cancel { slot } => {
                    if submitted_ids.is_empty() {
                        continue;
                    }
                    let id = submitted_ids[slot % submitted_ids.len()];
                    if let Ok(order) = book.cancel(id) {
                        canceled_qty += order.remaining();
                    }
                }
            }

            // The book is never crossed.
            if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
                prop_assert!(bid < ask, "crossed book: bid {bid} >= ask {ask}");
            }
        }

        book.update_snapshot();
        let snapshot = book.snapshot();
        let resting: i64 = snapshot.total_bid_qty() + snapshot.total_ask_qty();

        // Each trade consumes equal quantity from both sides.
        prop_assert_eq!(submitted_qty, 2 * matched_qty + canceled_qty + resting);
    }
}

#[derive(Debug, Clone)]
enum LedgerOp {
    Credit(i64),
    Debit(i64),
    Reserve(i64),
    Release(i64),
    DebitLocked(i64),
}

fn ledger_op() -> impl Strategy<Value = LedgerOp> {
    prop_oneof![
        (1..=500i64).prop_map(LedgerOp::Credit),
        (1..=500i64).prop_map(LedgerOp::Debit),
        (1..=500i64).prop_map(LedgerOp::Reserve),
        (1..=500i64).prop_map(LedgerOp::Release),
        (1..=500i64).prop_map(LedgerOp::DebitLocked),
    ]
}

proptest! {
    /// Balances never go negative, and a refused operation changes
    /// nothing.
    #[test]
    fn prop_ledger_never_negative(ops in proptest::collection::vec(ledger_op(), 1..100)) {
        let mut ledger = UserLedger::new(1);

        for op in ops {
            let before: AssetBalance = ledger.balance("USDT");
            let result = match op {
                LedgerOp::Credit(amount) => ledger.credit_available("USDT", amount),
                LedgerOp::Debit(amount) => ledger.debit_available("USDT", amount),
                LedgerOp::Reserve(amount) => ledger.reserve("USDT", amount),
                LedgerOp::Release(amount) => ledger.release("USDT", amount),
                LedgerOp::DebitLocked(amount) => ledger.debit_locked("USDT", amount),
            };

            let after = ledger.balance("USDT");
            prop_assert!(after.available >= 0);
            prop_assert!(after.locked >= 0);
            if result.is_err() {
                prop_assert_eq!(before, after);
            }
        }
    }
}
