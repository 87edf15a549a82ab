//! Durability: checkpoint + WAL replay reconstructs the exact book state.

use super::common::{EventLog, wait_until};
use exchange_core::{
    EngineConfig, MatchingEngine, OrderKind, OrderRequest, PRICE_SCALE, Side, SyncMode,
};
use std::time::Duration;

fn config(dir: &std::path::Path) -> EngineConfig {
    EngineConfig {
        sync_mode: SyncMode::Always,
        ..EngineConfig::new("BTC-USDT", dir)
    }
}

fn started(config: EngineConfig) -> (MatchingEngine, EventLog) {
    let mut engine =
        MatchingEngine::new(config).unwrap_or_else(|e| panic!("engine: {e}"));
    let log = EventLog::new();
    log.attach(&mut engine);
    engine.start().unwrap_or_else(|e| panic!("start: {e}"));
    (engine, log)
}

fn submit(engine: &MatchingEngine, side: Side, kind: OrderKind, price: i64, qty: i64) {
    engine
        .submit_order(OrderRequest {
            user_id: 1,
            side,
            kind,
            price,
            qty,
        })
        .unwrap_or_else(|e| panic!("submit: {e}"));
}

#[test]
fn test_wal_replay_restores_resting_orders() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
    let p = PRICE_SCALE;

    let before = {
        let (mut engine, log) = started(config(dir.path()));
        submit(&engine, Side::Sell, OrderKind::Limit, 50_100 * p, 10);
        submit(&engine, Side::Buy, OrderKind::Limit, 50_000 * p, 7);
        submit(&engine, Side::Buy, OrderKind::Limit, 50_100 * p, 4);
        assert!(wait_until(Duration::from_secs(5), || !log.trades().is_empty()));
        assert!(wait_until(Duration::from_secs(5), || {
            engine.depth().best_ask() == Some((50_100 * p, 6))
        }));
        let depth = engine.depth();
        engine.stop();
        depth
    };

    let (mut restored, log) = started(config(dir.path()));
    let after = restored.depth();
    assert_eq!(after.best_bid(), before.best_bid());
    assert_eq!(after.best_ask(), before.best_ask());
    assert_eq!(after.bids, before.bids);
    assert_eq!(after.asks, before.asks);
    // Recovery is silent: no replayed trades reach handlers.
    assert_eq!(log.event_count(), 0);
    restored.stop();
}

#[test]
fn test_recovery_preserves_fifo_priority() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
    let p = PRICE_SCALE;

    let (first_maker, second_maker) = {
        let (mut engine, _log) = started(config(dir.path()));
        let first = engine
            .submit_order(OrderRequest {
                user_id: 1,
                side: Side::Sell,
                kind: OrderKind::Limit,
                price: 100 * p,
                qty: 5,
            })
            .unwrap_or_else(|e| panic!("submit: {e}"));
        let second = engine
            .submit_order(OrderRequest {
                user_id: 2,
                side: Side::Sell,
                kind: OrderKind::Limit,
                price: 100 * p,
                qty: 5,
            })
            .unwrap_or_else(|e| panic!("submit: {e}"));
        assert!(wait_until(Duration::from_secs(5), || {
            engine.depth().best_ask() == Some((100 * p, 10))
        }));
        engine.stop();
        (first, second)
    };

    // After restart, a crossing buy must fill the earlier maker first.
    let (mut engine, log) = started(config(dir.path()));
    submit(&engine, Side::Buy, OrderKind::Limit, 100 * p, 7);
    assert!(wait_until(Duration::from_secs(5), || log.trades().len() == 2));
    let trades = log.trades();
    assert_eq!(trades[0].maker_order_id, first_maker);
    assert_eq!(trades[0].qty, 5);
    assert_eq!(trades[1].maker_order_id, second_maker);
    assert_eq!(trades[1].qty, 2);
    engine.stop();
}

#[test]
fn test_checkpoint_shortens_recovery() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
    let p = PRICE_SCALE;
    let mut cfg = config(dir.path());
    cfg.checkpoint_interval = 4;

    {
        let (mut engine, _log) = started(cfg.clone());
        for i in 0..6 {
            submit(&engine, Side::Buy, OrderKind::Limit, (100 + i) * p, 1);
        }
        assert!(wait_until(Duration::from_secs(5), || {
            engine.depth().best_bid() == Some((105 * p, 1))
        }));
        engine.stop();
    }

    // A checkpoint file exists after the fourth entry.
    let has_checkpoint = std::fs::read_dir(dir.path())
        .unwrap_or_else(|_| panic!("read_dir"))
        .filter_map(|entry| entry.ok())
        .any(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .starts_with("checkpoint_")
        });
    assert!(has_checkpoint);

    let (mut restored, _log) = started(cfg);
    let depth = restored.depth();
    assert_eq!(depth.best_bid(), Some((105 * p, 1)));
    assert_eq!(depth.bids.len(), 6);
    restored.stop();
}

#[test]
fn test_corrupt_wal_refuses_to_start() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
    {
        let (mut engine, _log) = started(config(dir.path()));
        submit(&engine, Side::Buy, OrderKind::Limit, 100 * PRICE_SCALE, 1);
        assert!(wait_until(Duration::from_secs(5), || {
            engine.depth().best_bid().is_some()
        }));
        engine.stop();
    }

    // Flip a payload byte.
    let wal_path = dir.path().join("wal.log");
    let mut bytes = std::fs::read(&wal_path).unwrap_or_default();
    assert!(!bytes.is_empty());
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xFF;
    std::fs::write(&wal_path, &bytes).unwrap_or_else(|_| panic!("write"));

    assert!(MatchingEngine::new(config(dir.path())).is_err());
}

#[test]
fn test_order_ids_stay_monotonic_across_restart() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));

    let last_before = {
        let (mut engine, _log) = started(config(dir.path()));
        let mut last = exchange_core::OrderId(0);
        for i in 0..3 {
            last = engine
                .submit_order(OrderRequest {
                    user_id: 1,
                    side: Side::Buy,
                    kind: OrderKind::Limit,
                    price: (100 + i) * PRICE_SCALE,
                    qty: 1,
                })
                .unwrap_or_else(|e| panic!("submit: {e}"));
        }
        assert!(wait_until(Duration::from_secs(5), || {
            engine.depth().bids.len() == 3
        }));
        engine.stop();
        last
    };

    let (mut restored, _log) = started(config(dir.path()));
    let next = restored
        .submit_order(OrderRequest {
            user_id: 1,
            side: Side::Buy,
            kind: OrderKind::Limit,
            price: 99 * PRICE_SCALE,
            qty: 1,
        })
        .unwrap_or_else(|e| panic!("submit: {e}"));
    assert!(next > last_before);
    restored.stop();
}
