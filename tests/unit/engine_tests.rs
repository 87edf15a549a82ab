//! Engine driver behavior: event routing, validation rejections, and
//! advisory depth updates.

use super::common::wait_until;
use exchange_core::{
    EngineConfig, EngineEvent, EventMask, MatchingEngine, OrderKind, OrderRequest, PRICE_SCALE,
    Side,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_handlers_receive_only_their_mask() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
    let mut engine = MatchingEngine::new(EngineConfig::new("BTC-USDT", dir.path()))
        .unwrap_or_else(|e| panic!("engine: {e}"));

    let trades_only: Arc<Mutex<Vec<EngineEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&trades_only);
    engine.register_handler(
        EventMask::TRADES,
        Arc::new(move |event| sink.lock().push(event.clone())),
    );
    engine.start().unwrap_or_else(|e| panic!("start: {e}"));

    let px = 100 * PRICE_SCALE;
    for (side, qty) in [(Side::Sell, 5), (Side::Buy, 5)] {
        engine
            .submit_order(OrderRequest {
                user_id: 1,
                side,
                kind: OrderKind::Limit,
                price: px,
                qty,
            })
            .unwrap_or_else(|e| panic!("submit: {e}"));
    }

    assert!(wait_until(Duration::from_secs(5), || {
        !trades_only.lock().is_empty()
    }));
    engine.stop();

    let seen = trades_only.lock();
    // Accepts and cancels never reached this handler.
    assert!(seen.iter().all(|event| matches!(event, EngineEvent::Trade(_))));
    assert_eq!(seen.len(), 1);
}

#[test]
fn test_invalid_order_is_rejected_with_event() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
    let mut engine = MatchingEngine::new(EngineConfig::new("BTC-USDT", dir.path()))
        .unwrap_or_else(|e| panic!("engine: {e}"));

    let rejections: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&rejections);
    engine.register_handler(
        EventMask::REJECTS,
        Arc::new(move |event| {
            if let EngineEvent::OrderRejected { reason, .. } = event {
                sink.lock().push(reason.clone());
            }
        }),
    );
    engine.start().unwrap_or_else(|e| panic!("start: {e}"));

    // Zero quantity never reaches the book.
    engine
        .submit_order(OrderRequest {
            user_id: 1,
            side: Side::Buy,
            kind: OrderKind::Limit,
            price: PRICE_SCALE,
            qty: 0,
        })
        .unwrap_or_else(|e| panic!("submit: {e}"));

    assert!(wait_until(Duration::from_secs(5), || {
        !rejections.lock().is_empty()
    }));
    engine.stop();
    assert_eq!(engine.stats().orders_rejected, 1);
    assert_eq!(engine.stats().orders_accepted, 0);
}

#[test]
fn test_depth_events_are_advisory() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
    let mut engine = MatchingEngine::new(EngineConfig::new("BTC-USDT", dir.path()))
        .unwrap_or_else(|e| panic!("engine: {e}"));

    let depth_updates = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&depth_updates);
    engine.register_handler(
        EventMask::DEPTH,
        Arc::new(move |event| {
            if matches!(event, EngineEvent::Depth { .. }) {
                *sink.lock() += 1;
            }
        }),
    );
    engine.start().unwrap_or_else(|e| panic!("start: {e}"));

    engine
        .submit_order(OrderRequest {
            user_id: 1,
            side: Side::Buy,
            kind: OrderKind::Limit,
            price: PRICE_SCALE,
            qty: 1,
        })
        .unwrap_or_else(|e| panic!("submit: {e}"));

    assert!(wait_until(Duration::from_secs(5), || {
        *depth_updates.lock() > 0
    }));
    engine.stop();
}

#[test]
fn test_two_engines_are_independent() {
    let dir_a = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
    let dir_b = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
    let mut btc = MatchingEngine::new(EngineConfig::new("BTC-USDT", dir_a.path()))
        .unwrap_or_else(|e| panic!("engine: {e}"));
    let mut eth = MatchingEngine::new(EngineConfig::new("ETH-USDT", dir_b.path()))
        .unwrap_or_else(|e| panic!("engine: {e}"));
    btc.start().unwrap_or_else(|e| panic!("start: {e}"));
    eth.start().unwrap_or_else(|e| panic!("start: {e}"));

    btc.submit_order(OrderRequest {
        user_id: 1,
        side: Side::Buy,
        kind: OrderKind::Limit,
        price: 50_000 * PRICE_SCALE,
        qty: 1,
    })
    .unwrap_or_else(|e| panic!("submit: {e}"));

    assert!(wait_until(Duration::from_secs(5), || {
        btc.depth().best_bid().is_some()
    }));
    assert!(eth.depth().best_bid().is_none());
    assert_eq!(eth.depth().symbol, "ETH-USDT");

    btc.stop();
    eth.stop();
}
