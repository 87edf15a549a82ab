//! Account engine scenarios: reserve/release symmetry, idempotency, fill
//! settlement, and shard persistence.

use exchange_core::{
    AccountConfig, AccountEngine, AccountError, FillEvent, PRICE_SCALE, TradeId,
};

fn engine() -> AccountEngine {
    AccountEngine::new(AccountConfig {
        num_shards: 4,
        ..AccountConfig::default()
    })
    .unwrap_or_else(|e| panic!("account engine: {e}"))
}

#[test]
fn test_reserve_release_symmetry() {
    let mut accounts = engine();
    let user = 7u64;
    accounts
        .apply_balance_change(user, "USDT", 10_000 * PRICE_SCALE, "deposit_1")
        .unwrap_or_else(|e| panic!("deposit: {e}"));

    accounts
        .reserve(user, "USDT", 5_000 * PRICE_SCALE, "reserve_1001")
        .unwrap_or_else(|e| panic!("reserve: {e}"));
    let snapshot = accounts
        .get_snapshot(user)
        .unwrap_or_else(|| panic!("snapshot"));
    assert_eq!(snapshot.balance("USDT").available, 5_000 * PRICE_SCALE);
    assert_eq!(snapshot.balance("USDT").locked, 5_000 * PRICE_SCALE);

    accounts
        .release(user, "USDT", 5_000 * PRICE_SCALE, "release_1001")
        .unwrap_or_else(|e| panic!("release: {e}"));
    let snapshot = accounts
        .get_snapshot(user)
        .unwrap_or_else(|| panic!("snapshot"));
    assert_eq!(snapshot.balance("USDT").available, 10_000 * PRICE_SCALE);
    assert_eq!(snapshot.balance("USDT").locked, 0);

    // Replaying the reserve with the same cmd_id refuses without touching
    // state.
    let duplicate = accounts.reserve(user, "USDT", 5_000 * PRICE_SCALE, "reserve_1001");
    assert!(matches!(duplicate, Err(AccountError::DuplicateCommand(_))));
    let snapshot = accounts
        .get_snapshot(user)
        .unwrap_or_else(|| panic!("snapshot"));
    assert_eq!(snapshot.balance("USDT").available, 10_000 * PRICE_SCALE);
    assert_eq!(snapshot.balance("USDT").locked, 0);

    assert_eq!(accounts.stats().duplicates, 1);
    accounts.stop();
}

#[test]
fn test_reserve_beyond_available_fails_cleanly() {
    let mut accounts = engine();
    accounts
        .apply_balance_change(1, "USDT", 100, "deposit_1")
        .unwrap_or_else(|e| panic!("deposit: {e}"));

    let result = accounts.reserve(1, "USDT", 200, "reserve_1");
    assert!(matches!(
        result,
        Err(AccountError::InsufficientBalance { available: 100, .. })
    ));
    let snapshot = accounts.get_snapshot(1).unwrap_or_else(|| panic!("snapshot"));
    assert_eq!(snapshot.balance("USDT").available, 100);
    assert_eq!(snapshot.balance("USDT").locked, 0);
    accounts.stop();
}

#[test]
fn test_spot_fill_settlement() {
    let mut accounts = engine();
    let buyer = 11u64;
    let seller = 22u64;
    let price = 50_000 * PRICE_SCALE;
    let qty = PRICE_SCALE / 10; // 0.1 BTC
    let quote_amount = 5_000 * PRICE_SCALE; // (price / P) * qty in USDT

    // Buyer: 100_000 USDT with 5_000 reserved against the order.
    accounts
        .apply_balance_change(buyer, "USDT", 100_000 * PRICE_SCALE, "dep_b")
        .unwrap_or_else(|e| panic!("deposit: {e}"));
    accounts
        .reserve(buyer, "USDT", 5_000 * PRICE_SCALE, "res_b")
        .unwrap_or_else(|e| panic!("reserve: {e}"));
    // Seller: 2 BTC with 0.1 reserved.
    accounts
        .apply_balance_change(seller, "BTC", 2 * PRICE_SCALE, "dep_s")
        .unwrap_or_else(|e| panic!("deposit: {e}"));
    accounts
        .reserve(seller, "BTC", qty, "res_s")
        .unwrap_or_else(|e| panic!("reserve: {e}"));

    let fill = FillEvent {
        trade_id: TradeId(1),
        buyer,
        seller,
        base_asset: "BTC".to_string(),
        quote_asset: "USDT".to_string(),
        price,
        qty,
        buyer_fee: 0,
        seller_fee: 0,
        fee_asset: "USDT".to_string(),
    };
    accounts
        .apply_fill(&fill)
        .unwrap_or_else(|e| panic!("fill: {e}"));

    // price/P * qty = 5_000 USDT.
    let buyer_snapshot = accounts
        .get_snapshot(buyer)
        .unwrap_or_else(|| panic!("snapshot"));
    assert_eq!(buyer_snapshot.balance("BTC").available, qty);
    assert_eq!(buyer_snapshot.balance("USDT").locked, 0);
    assert_eq!(
        buyer_snapshot.balance("USDT").available,
        95_000 * PRICE_SCALE
    );

    let seller_snapshot = accounts
        .get_snapshot(seller)
        .unwrap_or_else(|| panic!("snapshot"));
    assert_eq!(seller_snapshot.balance("USDT").available, quote_amount);
    assert_eq!(seller_snapshot.balance("BTC").locked, 0);
    assert_eq!(
        seller_snapshot.balance("BTC").available,
        2 * PRICE_SCALE - qty
    );

    // Duplicate delivery of the same trade id changes nothing.
    accounts
        .apply_fill(&fill)
        .unwrap_or_else(|e| panic!("redelivery: {e}"));
    let buyer_snapshot = accounts
        .get_snapshot(buyer)
        .unwrap_or_else(|| panic!("snapshot"));
    assert_eq!(buyer_snapshot.balance("BTC").available, qty);
    assert_eq!(
        buyer_snapshot.balance("USDT").available,
        95_000 * PRICE_SCALE
    );
    accounts.stop();
}

#[test]
fn test_fill_with_fee_deducts_from_available() {
    let mut accounts = engine();
    let buyer = 1u64;
    let seller = 2u64;

    accounts
        .apply_balance_change(buyer, "USDT", 200 * PRICE_SCALE, "dep_b")
        .unwrap_or_else(|e| panic!("deposit: {e}"));
    accounts
        .reserve(buyer, "USDT", 100 * PRICE_SCALE, "res_b")
        .unwrap_or_else(|e| panic!("reserve: {e}"));
    accounts
        .apply_balance_change(seller, "BTC", PRICE_SCALE, "dep_s")
        .unwrap_or_else(|e| panic!("deposit: {e}"));
    accounts
        .reserve(seller, "BTC", PRICE_SCALE, "res_s")
        .unwrap_or_else(|e| panic!("reserve: {e}"));

    accounts
        .apply_fill(&FillEvent {
            trade_id: TradeId(9),
            buyer,
            seller,
            base_asset: "BTC".to_string(),
            quote_asset: "USDT".to_string(),
            price: 100 * PRICE_SCALE,
            qty: PRICE_SCALE,
            buyer_fee: PRICE_SCALE, // 1 USDT
            seller_fee: 0,
            fee_asset: "USDT".to_string(),
        })
        .unwrap_or_else(|e| panic!("fill: {e}"));

    let buyer_snapshot = accounts
        .get_snapshot(buyer)
        .unwrap_or_else(|| panic!("snapshot"));
    // 200 deposited, 100 locked then settled, 1 fee from available.
    assert_eq!(buyer_snapshot.balance("USDT").available, 99 * PRICE_SCALE);
    assert_eq!(buyer_snapshot.balance("BTC").available, PRICE_SCALE);
    accounts.stop();
}

#[test]
fn test_shard_persistence_roundtrip() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
    let config = AccountConfig {
        num_shards: 2,
        wal_dir: Some(dir.path().to_path_buf()),
        ..AccountConfig::default()
    };

    {
        let mut accounts =
            AccountEngine::new(config.clone()).unwrap_or_else(|e| panic!("account engine: {e}"));
        accounts
            .apply_balance_change(5, "USDT", 1_000, "dep_1")
            .unwrap_or_else(|e| panic!("deposit: {e}"));
        accounts
            .reserve(5, "USDT", 400, "res_1")
            .unwrap_or_else(|e| panic!("reserve: {e}"));
        accounts.stop();
    }

    let mut restored =
        AccountEngine::new(config).unwrap_or_else(|e| panic!("account engine: {e}"));
    let snapshot = restored.get_snapshot(5).unwrap_or_else(|| panic!("snapshot"));
    assert_eq!(snapshot.balance("USDT").available, 600);
    assert_eq!(snapshot.balance("USDT").locked, 400);

    // Idempotency survives the restart.
    assert!(matches!(
        restored.reserve(5, "USDT", 400, "res_1"),
        Err(AccountError::DuplicateCommand(_))
    ));
    restored.stop();
}

#[test]
fn test_per_user_commands_are_fifo() {
    let mut accounts = engine();
    accounts
        .apply_balance_change(3, "USDT", 1_000, "dep_1")
        .unwrap_or_else(|e| panic!("deposit: {e}"));
    for i in 0..10 {
        accounts
            .reserve(3, "USDT", 100, format!("res_{i}"))
            .unwrap_or_else(|e| panic!("reserve: {e}"));
    }
    let snapshot = accounts.get_snapshot(3).unwrap_or_else(|| panic!("snapshot"));
    assert_eq!(snapshot.balance("USDT").available, 0);
    assert_eq!(snapshot.balance("USDT").locked, 1_000);

    // The eleventh reserve finds nothing left.
    assert!(matches!(
        accounts.reserve(3, "USDT", 100, "res_10"),
        Err(AccountError::InsufficientBalance { .. })
    ));
    accounts.stop();
}

#[test]
fn test_evict_idle_spares_funded_ledgers() {
    let mut accounts = engine();
    accounts
        .apply_balance_change(1, "USDT", 100, "dep_1")
        .unwrap_or_else(|e| panic!("deposit: {e}"));
    // User 2 touches the shard but ends flat.
    accounts
        .apply_balance_change(2, "USDT", 50, "dep_2")
        .unwrap_or_else(|e| panic!("deposit: {e}"));
    accounts
        .apply_balance_change(2, "USDT", -50, "wd_2")
        .unwrap_or_else(|e| panic!("withdraw: {e}"));

    let evicted = accounts
        .evict_idle(std::time::Duration::ZERO)
        .unwrap_or_else(|e| panic!("evict: {e}"));
    assert_eq!(evicted, 1);
    assert!(accounts.get_snapshot(2).is_none());
    assert!(accounts.get_snapshot(1).is_some());
    accounts.stop();
}
