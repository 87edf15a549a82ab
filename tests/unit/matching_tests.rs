//! End-to-end matching scenarios through the engine driver.

use super::common::{EventLog, wait_until};
use exchange_core::{
    EngineConfig, EngineError, MatchingEngine, OrderKind, OrderRequest, PRICE_SCALE, Side,
};
use std::time::Duration;

fn engine_in(dir: &std::path::Path) -> (MatchingEngine, EventLog) {
    let mut engine = MatchingEngine::new(EngineConfig::new("BTC-USDT", dir))
        .unwrap_or_else(|e| panic!("engine: {e}"));
    let log = EventLog::new();
    log.attach(&mut engine);
    engine.start().unwrap_or_else(|e| panic!("start: {e}"));
    (engine, log)
}

fn submit(
    engine: &MatchingEngine,
    user_id: u64,
    side: Side,
    kind: OrderKind,
    price: i64,
    qty: i64,
) -> exchange_core::OrderId {
    engine
        .submit_order(OrderRequest {
            user_id,
            side,
            kind,
            price,
            qty,
        })
        .unwrap_or_else(|e| panic!("submit: {e}"))
}

#[test]
fn test_simple_match_at_maker_price() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
    let (mut engine, log) = engine_in(dir.path());
    let px = 50_000 * PRICE_SCALE;

    let maker = submit(&engine, 1, Side::Sell, OrderKind::Limit, px, 10);
    let taker = submit(&engine, 2, Side::Buy, OrderKind::Limit, px, 5);

    assert!(wait_until(Duration::from_secs(5), || !log.trades().is_empty()));
    let trades = log.trades();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].price, px);
    assert_eq!(trades[0].qty, 5);
    assert_eq!(trades[0].taker_order_id, taker);
    assert_eq!(trades[0].maker_order_id, maker);
    assert_eq!(trades[0].taker_side, Side::Buy);

    // Depth: bids empty, asks show the maker's remainder.
    assert!(wait_until(Duration::from_secs(5), || {
        engine.depth().best_ask() == Some((px, 5))
    }));
    let depth = engine.depth();
    assert!(depth.best_bid().is_none());
    assert_eq!(depth.best_ask(), Some((px, 5)));

    engine.stop();
}

#[test]
fn test_market_order_walks_the_book() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
    let (mut engine, log) = engine_in(dir.path());
    let p = PRICE_SCALE;

    submit(&engine, 1, Side::Sell, OrderKind::Limit, 50_000 * p, 5);
    submit(&engine, 1, Side::Sell, OrderKind::Limit, 50_100 * p, 5);
    submit(&engine, 1, Side::Sell, OrderKind::Limit, 50_200 * p, 5);
    submit(&engine, 2, Side::Buy, OrderKind::Market, 0, 12);

    assert!(wait_until(Duration::from_secs(5), || log.trades().len() == 3));
    let trades = log.trades();
    let prices: Vec<i64> = trades.iter().map(|t| t.price).collect();
    let qtys: Vec<i64> = trades.iter().map(|t| t.qty).collect();
    assert_eq!(prices, vec![50_000 * p, 50_100 * p, 50_200 * p]);
    assert_eq!(qtys, vec![5, 5, 2]);

    assert!(wait_until(Duration::from_secs(5), || {
        engine.depth().best_ask() == Some((50_200 * p, 3))
    }));
    engine.stop();
}

#[test]
fn test_passive_limit_rests_without_trades() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
    let (mut engine, log) = engine_in(dir.path());
    let p = PRICE_SCALE;

    submit(&engine, 1, Side::Sell, OrderKind::Limit, 50_100 * p, 10);
    submit(&engine, 2, Side::Buy, OrderKind::Limit, 50_000 * p, 10);

    assert!(wait_until(Duration::from_secs(5), || {
        let depth = engine.depth();
        depth.best_bid() == Some((50_000 * p, 10)) && depth.best_ask() == Some((50_100 * p, 10))
    }));
    assert!(log.trades().is_empty());
    let depth = engine.depth();
    assert_eq!(depth.spread(), Some(100 * p));
    engine.stop();
}

#[test]
fn test_cancel_removes_resting_order() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
    let (mut engine, log) = engine_in(dir.path());

    let order_id = submit(&engine, 1, Side::Buy, OrderKind::Limit, 100 * PRICE_SCALE, 10);
    assert!(wait_until(Duration::from_secs(5), || {
        engine.depth().best_bid().is_some()
    }));

    engine
        .submit_cancel(order_id)
        .unwrap_or_else(|e| panic!("cancel: {e}"));
    assert!(wait_until(Duration::from_secs(5), || {
        engine.depth().best_bid().is_none()
    }));
    assert_eq!(
        log.count_where(|e| matches!(e, exchange_core::EngineEvent::OrderCanceled { .. })),
        1
    );
    engine.stop();
}

#[test]
fn test_fok_and_post_only_rejections() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
    let (mut engine, log) = engine_in(dir.path());
    let px = 100 * PRICE_SCALE;

    submit(&engine, 1, Side::Sell, OrderKind::Limit, px, 5);

    // FOK for more than the book holds.
    submit(&engine, 2, Side::Buy, OrderKind::Fok, px, 8);
    // Post-only that would cross.
    submit(&engine, 2, Side::Buy, OrderKind::PostOnly, px, 5);

    assert!(wait_until(Duration::from_secs(5), || {
        log.count_where(|e| matches!(e, exchange_core::EngineEvent::OrderRejected { .. })) == 2
    }));
    assert!(log.trades().is_empty());
    // The resting ask was never touched.
    assert_eq!(engine.depth().best_ask(), Some((px, 5)));
    engine.stop();
}

#[test]
fn test_submission_after_stop_is_closed() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
    let (mut engine, _log) = engine_in(dir.path());
    engine.stop();

    let result = engine.submit_order(OrderRequest {
        user_id: 1,
        side: Side::Buy,
        kind: OrderKind::Limit,
        price: PRICE_SCALE,
        qty: 1,
    });
    assert!(matches!(result, Err(EngineError::Closed)));
    assert!(matches!(
        engine.submit_cancel(exchange_core::OrderId(1)),
        Err(EngineError::Closed)
    ));
}

#[test]
fn test_stats_track_operations() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
    let (mut engine, log) = engine_in(dir.path());
    let px = 100 * PRICE_SCALE;

    submit(&engine, 1, Side::Sell, OrderKind::Limit, px, 5);
    submit(&engine, 2, Side::Buy, OrderKind::Limit, px, 5);
    assert!(wait_until(Duration::from_secs(5), || !log.trades().is_empty()));
    engine.stop();

    let stats = engine.stats();
    assert_eq!(stats.orders_submitted, 2);
    assert_eq!(stats.orders_accepted, 2);
    assert_eq!(stats.trades, 1);
}
