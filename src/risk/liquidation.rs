//! Liquidation engine: tiered checkers, a price-triggered fast path, and a
//! bounded worker pool.
//!
//! Three checker loops re-evaluate the Warning, Danger, and Critical tiers
//! at their own cadences. `on_price_change` is the fast path: a mark-price
//! move re-checks only the Critical users exposed to that symbol. Both
//! paths feed a bounded task channel consumed by the worker pool, guarded
//! by an in-flight set so at most one liquidation runs per user at a time.
//! On queue saturation the task is dropped and counted; a deployment must
//! alert on that counter.

use super::index::RiskTierIndex;
use super::math::compute_risk;
use super::provider::UserDataProvider;
use super::types::{
    LIQUIDATE_RATIO, LiquidationResult, LiquidationTask, RiskLevel, RiskOutput, UserRiskData,
    classify,
};
use crate::config::RiskConfig;
use crate::types::UserId;
use crate::utils::current_time_millis;
use crossbeam::channel::{Receiver, Sender, TrySendError, bounded, tick};
use dashmap::DashSet;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Executes the actual close-out: submits market/limit orders back into the
/// matcher and settles against the insurance fund.
///
/// `execute` blocks and must respect `timeout`; the worker logs overruns.
pub trait LiquidationExecutor: Send + Sync {
    /// Liquidates one user.
    fn execute(&self, task: &LiquidationTask, timeout: Duration) -> LiquidationResult;
}

/// Cloneable producer handle onto the liquidation task queue.
///
/// The in-flight guard lives here: a user with a task queued or running is
/// never enqueued a second time.
#[derive(Clone)]
pub struct TaskTrigger {
    tx: Sender<LiquidationTask>,
    in_flight: Arc<DashSet<UserId>>,
    dropped: Arc<AtomicU64>,
}

impl TaskTrigger {
    /// Non-blocking enqueue. Returns whether the task was accepted.
    pub fn fire(&self, task: LiquidationTask) -> bool {
        if !self.in_flight.insert(task.user_id) {
            trace!("liquidation of user {} already in flight", task.user_id);
            return false;
        }
        match self.tx.try_send(task) {
            Ok(()) => true,
            Err(TrySendError::Full(task)) | Err(TrySendError::Disconnected(task)) => {
                self.in_flight.remove(&task.user_id);
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "liquidation task queue saturated, dropped task for user {} (total dropped {dropped})",
                    task.user_id
                );
                false
            }
        }
    }
}

/// Liquidation engine counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LiquidationStats {
    /// Liquidations that completed successfully.
    pub executed: u64,
    /// Liquidations whose executor reported failure.
    pub failed: u64,
    /// Tasks dropped on queue saturation.
    pub dropped: u64,
    /// Users with a liquidation queued or running right now.
    pub in_flight: usize,
}

/// The engine: checker threads plus the worker pool.
pub struct LiquidationEngine {
    index: Arc<RiskTierIndex>,
    provider: Arc<dyn UserDataProvider>,
    executor: Arc<dyn LiquidationExecutor>,
    config: RiskConfig,
    task_tx: Option<Sender<LiquidationTask>>,
    task_rx: Option<Receiver<LiquidationTask>>,
    in_flight: Arc<DashSet<UserId>>,
    dropped: Arc<AtomicU64>,
    executed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
    shutdowns: Vec<Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

impl LiquidationEngine {
    /// Builds the engine; call [`start`](Self::start) to spawn threads.
    pub fn new(
        index: Arc<RiskTierIndex>,
        provider: Arc<dyn UserDataProvider>,
        executor: Arc<dyn LiquidationExecutor>,
        config: RiskConfig,
    ) -> Self {
        let (task_tx, task_rx) = bounded(config.task_queue_size);
        Self {
            index,
            provider,
            executor,
            config,
            task_tx: Some(task_tx),
            task_rx: Some(task_rx),
            in_flight: Arc::new(DashSet::new()),
            dropped: Arc::new(AtomicU64::new(0)),
            executed: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
            shutdowns: Vec::new(),
            handles: Vec::new(),
        }
    }

    /// A producer handle for the scanner and external price feeds.
    ///
    /// Returns `None` after [`stop`](Self::stop).
    pub fn trigger_handle(&self) -> Option<TaskTrigger> {
        Some(TaskTrigger {
            tx: self.task_tx.clone()?,
            in_flight: Arc::clone(&self.in_flight),
            dropped: Arc::clone(&self.dropped),
        })
    }

    /// Spawns the three tier checkers and the worker pool. A no-op after
    /// [`stop`](Self::stop) or a second call.
    pub fn start(&mut self) {
        if self.task_tx.is_none() {
            return;
        }
        let Some(task_rx) = self.task_rx.take() else {
            return;
        };

        let cadences = [
            (RiskLevel::Warning, self.config.warning_interval_ms),
            (RiskLevel::Danger, self.config.danger_interval_ms),
            (RiskLevel::Critical, self.config.critical_interval_ms),
        ];
        for (level, interval_ms) in cadences {
            let Some(trigger) = self.trigger_handle() else {
                return;
            };
            let (shutdown_tx, shutdown_rx) = bounded(1);
            self.shutdowns.push(shutdown_tx);
            let ctx = CheckerCtx {
                index: Arc::clone(&self.index),
                provider: Arc::clone(&self.provider),
                trigger,
            };
            let handle = std::thread::Builder::new()
                .name(format!("risk-check-{level}"))
                .spawn(move || run_checker(ctx, level, Duration::from_millis(interval_ms), shutdown_rx))
                .unwrap_or_else(|e| panic!("failed to spawn checker thread: {e}"));
            self.handles.push(handle);
        }

        let timeout = Duration::from_millis(self.config.task_timeout_ms);
        for worker_id in 0..self.config.worker_count {
            let (shutdown_tx, shutdown_rx) = bounded(1);
            self.shutdowns.push(shutdown_tx);
            let worker = Worker {
                id: worker_id,
                executor: Arc::clone(&self.executor),
                in_flight: Arc::clone(&self.in_flight),
                executed: Arc::clone(&self.executed),
                failed: Arc::clone(&self.failed),
                timeout,
            };
            let task_rx = task_rx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("liq-worker-{worker_id}"))
                .spawn(move || worker.run(task_rx, shutdown_rx))
                .unwrap_or_else(|e| panic!("failed to spawn worker thread: {e}"));
            self.handles.push(handle);
        }
        info!(
            "liquidation engine started: {} workers, queue {}",
            self.config.worker_count, self.config.task_queue_size
        );
    }

    /// Price-trigger fast path, invoked from the market-data system.
    ///
    /// Only Critical users exposed to `symbol` are re-checked; the fresh
    /// mark overrides whatever the provider returns for that symbol.
    pub fn on_price_change(&self, symbol: &str, mark_price: i64) {
        let Some(trigger) = self.trigger_handle() else {
            return;
        };
        for user_id in self.index.users_for_symbol(symbol) {
            if self.index.level_of(user_id) != RiskLevel::Critical {
                continue;
            }
            let Some(mut input) = self.provider.get_user_risk_input(user_id) else {
                continue;
            };
            input.marks.insert(symbol.to_string(), mark_price);
            let output = compute_risk(&input);
            if output.risk_ratio >= LIQUIDATE_RATIO {
                debug!(
                    "price trigger: user {user_id} crossed liquidation on {symbol} at {mark_price}"
                );
                if trigger.fire(make_task(user_id, symbol, mark_price, &output)) {
                    self.index.remove_user(user_id);
                }
            }
        }
    }

    /// Runs one checker pass over a tier. Exposed for deterministic tests;
    /// the background checkers call the same code on their cadences.
    pub fn check_tier_once(&self, level: RiskLevel) {
        let Some(trigger) = self.trigger_handle() else {
            return;
        };
        let ctx = CheckerCtx {
            index: Arc::clone(&self.index),
            provider: Arc::clone(&self.provider),
            trigger,
        };
        check_tier(&ctx, level);
    }

    /// Current counters.
    pub fn stats(&self) -> LiquidationStats {
        LiquidationStats {
            executed: self.executed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            in_flight: self.in_flight.len(),
        }
    }

    /// Stops checkers and workers, joining every thread. Idempotent.
    pub fn stop(&mut self) {
        for shutdown in &self.shutdowns {
            let _ = shutdown.try_send(());
        }
        self.shutdowns.clear();
        // Dropping the engine's producer lets the workers' recv() end once
        // external trigger handles are gone too.
        self.task_tx = None;
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!("liquidation thread panicked");
            }
        }
        info!("liquidation engine stopped");
    }
}

impl Drop for LiquidationEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

struct CheckerCtx {
    index: Arc<RiskTierIndex>,
    provider: Arc<dyn UserDataProvider>,
    trigger: TaskTrigger,
}

fn run_checker(ctx: CheckerCtx, level: RiskLevel, interval: Duration, shutdown_rx: Receiver<()>) {
    debug!("checker for {level} started at {interval:?}");
    let ticker = tick(interval);
    loop {
        crossbeam::select! {
            recv(shutdown_rx) -> _ => break,
            recv(ticker) -> _ => check_tier(&ctx, level),
        }
    }
    debug!("checker for {level} stopped");
}

/// Re-evaluates every user in `level`, updating, moving, demoting, or
/// escalating each.
fn check_tier(ctx: &CheckerCtx, level: RiskLevel) {
    let now_ms = current_time_millis();
    for entry in ctx.index.users_in(level) {
        let user_id = entry.user_id;
        let Some(input) = ctx.provider.get_user_risk_input(user_id) else {
            // Positions are gone; nothing left to monitor.
            ctx.index.remove_user(user_id);
            continue;
        };
        let output = compute_risk(&input);
        match classify(output.risk_ratio) {
            RiskLevel::Safe => ctx.index.remove_user(user_id),
            RiskLevel::Liquidate => {
                let symbol = input
                    .positions
                    .first()
                    .map(|position| position.symbol.clone())
                    .unwrap_or_default();
                let mark = input.marks.get(&symbol).copied().unwrap_or(0);
                ctx.trigger.fire(make_task(user_id, &symbol, mark, &output));
                // Liquidate never lingers in a tier; re-entry goes through a
                // full re-scan after the close-out.
                ctx.index.remove_user(user_id);
            }
            _ => {
                ctx.index
                    .update_user(UserRiskData::from_evaluation(&input, &output, now_ms));
            }
        }
    }
}

fn make_task(user_id: UserId, symbol: &str, mark: i64, output: &RiskOutput) -> LiquidationTask {
    LiquidationTask {
        user_id,
        trigger_symbol: symbol.to_string(),
        risk_ratio: output.risk_ratio,
        trigger_price: mark,
        created_at: current_time_millis(),
        priority: output.risk_ratio,
    }
}

struct Worker {
    id: usize,
    executor: Arc<dyn LiquidationExecutor>,
    in_flight: Arc<DashSet<UserId>>,
    executed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
    timeout: Duration,
}

impl Worker {
    fn run(&self, task_rx: Receiver<LiquidationTask>, shutdown_rx: Receiver<()>) {
        debug!("liquidation worker {} started", self.id);
        loop {
            crossbeam::select! {
                recv(shutdown_rx) -> _ => break,
                recv(task_rx) -> msg => {
                    let Ok(task) = msg else { break };
                    self.execute(task);
                }
            }
        }
        debug!("liquidation worker {} stopped", self.id);
    }

    fn execute(&self, task: LiquidationTask) {
        info!(
            "worker {}: liquidating user {} (ratio {}, trigger {})",
            self.id, task.user_id, task.risk_ratio, task.trigger_symbol
        );
        let started = Instant::now();
        let result = self.executor.execute(&task, self.timeout);
        let elapsed = started.elapsed();
        if elapsed > self.timeout {
            warn!(
                "worker {}: liquidation of user {} overran its timeout ({elapsed:?})",
                self.id, task.user_id
            );
        }
        if result.success {
            self.executed.fetch_add(1, Ordering::Relaxed);
            info!(
                "worker {}: liquidated user {}: {} positions closed, pnl {}",
                self.id, task.user_id, result.closed_positions, result.total_pnl
            );
        } else {
            // No retry here; the next scan re-evaluates the user.
            self.failed.fetch_add(1, Ordering::Relaxed);
            error!(
                "worker {}: liquidation of user {} failed: {}",
                self.id,
                task.user_id,
                result.error.as_deref().unwrap_or("unknown")
            );
        }
        self.in_flight.remove(&task.user_id);
    }
}
