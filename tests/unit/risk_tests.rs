//! Risk pipeline scenarios: scanning, tier movement, the price-trigger
//! fast path, and liquidation dispatch.

use super::common::wait_until;
use exchange_core::risk::math::compute_risk;
use exchange_core::{
    LiquidationEngine, LiquidationExecutor, LiquidationResult, LiquidationTask, PRICE_SCALE,
    Position, RiskConfig, RiskInput, RiskLevel, RiskScanner, RiskTierIndex, UserDataProvider,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

struct MockProvider {
    inputs: Mutex<HashMap<u64, RiskInput>>,
}

impl MockProvider {
    fn new() -> Self {
        Self {
            inputs: Mutex::new(HashMap::new()),
        }
    }

    /// One 1-BTC position at entry = mark = 100 with a 7.5% maintenance
    /// rate: maintenance margin is 7.5, so `balance` sets the ratio
    /// directly (10 → 0.75, 8 → ~0.94, 7.5 → 1.0).
    fn set_user(&self, user_id: u64, balance_units: i64, mark_units: i64) {
        let mut marks = HashMap::new();
        marks.insert("BTC-USDT".to_string(), mark_units * PRICE_SCALE);
        self.inputs.lock().insert(
            user_id,
            RiskInput {
                user_id,
                balance: balance_units * PRICE_SCALE,
                positions: vec![Position {
                    user_id,
                    symbol: "BTC-USDT".to_string(),
                    qty: PRICE_SCALE,
                    entry_price: 100 * PRICE_SCALE,
                    margin: 0,
                    maintenance_margin_rate: 750,
                    realized_pnl: 0,
                }],
                marks,
            },
        );
    }

    fn remove_user(&self, user_id: u64) {
        self.inputs.lock().remove(&user_id);
    }
}

impl UserDataProvider for MockProvider {
    fn get_all_user_ids(&self) -> Vec<u64> {
        self.inputs.lock().keys().copied().collect()
    }

    fn get_user_risk_input(&self, user_id: u64) -> Option<RiskInput> {
        self.inputs.lock().get(&user_id).cloned()
    }
}

struct RecordingExecutor {
    tasks: Mutex<Vec<LiquidationTask>>,
}

impl LiquidationExecutor for RecordingExecutor {
    fn execute(&self, task: &LiquidationTask, _timeout: Duration) -> LiquidationResult {
        self.tasks.lock().push(task.clone());
        LiquidationResult {
            success: true,
            error: None,
            closed_positions: 1,
            total_pnl: 0,
            remaining_balance: 0,
        }
    }
}

fn pipeline(
    provider: Arc<MockProvider>,
) -> (
    Arc<RiskTierIndex>,
    LiquidationEngine,
    RiskScanner,
    Arc<RecordingExecutor>,
) {
    let index = Arc::new(RiskTierIndex::new());
    let executor = Arc::new(RecordingExecutor {
        tasks: Mutex::new(Vec::new()),
    });
    let engine = LiquidationEngine::new(
        Arc::clone(&index),
        Arc::clone(&provider) as Arc<dyn UserDataProvider>,
        Arc::clone(&executor) as Arc<dyn LiquidationExecutor>,
        RiskConfig {
            worker_count: 2,
            task_queue_size: 16,
            ..RiskConfig::default()
        },
    );
    let trigger = engine
        .trigger_handle()
        .unwrap_or_else(|| panic!("trigger"));
    let scanner = RiskScanner::new(
        provider as Arc<dyn UserDataProvider>,
        Arc::clone(&index),
        trigger,
        RiskConfig {
            num_shards: 2,
            ..RiskConfig::default()
        },
    );
    (index, engine, scanner, executor)
}

#[test]
fn test_scan_assigns_tiers() {
    let provider = Arc::new(MockProvider::new());
    provider.set_user(1, 1_000, 100); // ratio 0.0075: safe
    provider.set_user(2, 10, 100); // 0.75: warning
    provider.set_user(3, 9, 100); // ~0.83: danger
    provider.set_user(4, 8, 100); // ~0.94: critical
    let (index, _engine, scanner, _executor) = pipeline(Arc::clone(&provider));

    scanner.scan_once();

    assert_eq!(index.level_of(1), RiskLevel::Safe);
    assert_eq!(index.level_of(2), RiskLevel::Warning);
    assert_eq!(index.level_of(3), RiskLevel::Danger);
    assert_eq!(index.level_of(4), RiskLevel::Critical);
    assert_eq!(index.monitored_count(), 3);

    let mut exposed = index.users_for_symbol("BTC-USDT");
    exposed.sort_unstable();
    assert_eq!(exposed, vec![2, 3, 4]);
    assert_eq!(scanner.scans_completed(), 1);
}

#[test]
fn test_underwater_account_emits_one_liquidation_task() {
    // Balance 100, 0.1 BTC from 50_000, mark drops to 49_000: unrealized
    // pnl is exactly -100, equity 0, ratio +∞.
    let provider = Arc::new(MockProvider::new());
    {
        let mut marks = HashMap::new();
        marks.insert("BTC-USDT".to_string(), 49_000 * PRICE_SCALE);
        provider.inputs.lock().insert(
            6,
            RiskInput {
                user_id: 6,
                balance: 100 * PRICE_SCALE,
                positions: vec![Position {
                    user_id: 6,
                    symbol: "BTC-USDT".to_string(),
                    qty: PRICE_SCALE / 10,
                    entry_price: 50_000 * PRICE_SCALE,
                    margin: 0,
                    maintenance_margin_rate: 50,
                    realized_pnl: 0,
                }],
                marks,
            },
        );
    }
    let (index, mut engine, scanner, executor) = pipeline(Arc::clone(&provider));

    // Workers are not running yet: the task stays queued and the in-flight
    // guard holds, so a second scan emits nothing new.
    scanner.scan_once();
    scanner.scan_once();
    assert_eq!(index.level_of(6), RiskLevel::Safe);
    assert_eq!(index.monitored_count(), 0);
    assert_eq!(engine.stats().in_flight, 1);
    assert_eq!(engine.stats().dropped, 0);

    engine.start();
    assert!(wait_until(Duration::from_secs(5), || {
        engine.stats().executed == 1
    }));
    engine.stop();

    let tasks = executor.tasks.lock();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].user_id, 6);
    assert_eq!(tasks[0].trigger_symbol, "BTC-USDT");
    assert!(tasks[0].risk_ratio >= exchange_core::risk::LIQUIDATE_RATIO);
}

#[test]
fn test_checker_moves_users_between_tiers() {
    let provider = Arc::new(MockProvider::new());
    provider.set_user(1, 10, 100); // warning
    let (index, engine, scanner, _executor) = pipeline(Arc::clone(&provider));
    scanner.scan_once();
    assert_eq!(index.level_of(1), RiskLevel::Warning);

    // The account deteriorates: the warning checker escalates it.
    provider.set_user(1, 8, 100);
    engine.check_tier_once(RiskLevel::Warning);
    assert_eq!(index.level_of(1), RiskLevel::Critical);

    // It recovers fully: the critical checker demotes it out of the index.
    provider.set_user(1, 1_000, 100);
    engine.check_tier_once(RiskLevel::Critical);
    assert_eq!(index.level_of(1), RiskLevel::Safe);
    assert_eq!(index.monitored_count(), 0);
}

#[test]
fn test_checker_drops_users_without_positions() {
    let provider = Arc::new(MockProvider::new());
    provider.set_user(1, 10, 100);
    let (index, engine, scanner, _executor) = pipeline(Arc::clone(&provider));
    scanner.scan_once();
    assert_eq!(index.level_of(1), RiskLevel::Warning);

    provider.remove_user(1);
    engine.check_tier_once(RiskLevel::Warning);
    assert_eq!(index.level_of(1), RiskLevel::Safe);
}

#[test]
fn test_price_trigger_fires_for_critical_users_only() {
    let provider = Arc::new(MockProvider::new());
    provider.set_user(1, 10, 100); // warning
    provider.set_user(2, 8, 100); // critical
    let (index, mut engine, scanner, executor) = pipeline(Arc::clone(&provider));
    scanner.scan_once();
    engine.start();

    // A mark-price collapse: both users' provider inputs still show 100,
    // but the override pushes the critical user past the threshold.
    provider.set_user(1, 10, 100);
    provider.set_user(2, 8, 100);
    engine.on_price_change("BTC-USDT", 91 * PRICE_SCALE);

    assert!(wait_until(Duration::from_secs(5), || {
        engine.stats().executed == 1
    }));
    engine.stop();

    let tasks = executor.tasks.lock();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].user_id, 2);
    assert_eq!(tasks[0].trigger_price, 91 * PRICE_SCALE);
    // The liquidated user left the index; the warning user stayed.
    assert_eq!(index.level_of(2), RiskLevel::Safe);
    assert_eq!(index.level_of(1), RiskLevel::Warning);
}

#[test]
fn test_compute_risk_matches_classification() {
    let provider = MockProvider::new();
    provider.set_user(1, 8, 100);
    let input = provider
        .get_user_risk_input(1)
        .unwrap_or_else(|| panic!("input"));
    let output = compute_risk(&input);
    // maint 7.5 / equity 8 = 0.9375.
    assert_eq!(output.maint_margin_req, 75 * PRICE_SCALE / 10);
    assert_eq!(output.risk_ratio, 9_375);
    assert_eq!(exchange_core::risk::classify(output.risk_ratio), RiskLevel::Critical);
}
