//! Sharded full-scan of every user with positions.
//!
//! Each tick partitions the user set by `user_id % num_shards`, evaluates
//! the shards in parallel, then atomically replaces each monitored tier's
//! contents. Safe users are discarded, Liquidate users become tasks on the
//! spot. Shard result buffers come from a small pool so steady-state scans
//! allocate nothing per user.

use super::index::RiskTierIndex;
use super::liquidation::TaskTrigger;
use super::math::compute_risk;
use super::provider::UserDataProvider;
use super::types::{LiquidationTask, RiskLevel, UserRiskData, classify};
use crate::config::RiskConfig;
use crate::types::UserId;
use crate::utils::current_time_millis;
use crossbeam::channel::{Receiver, Sender, bounded, tick};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info};

/// A pool of reusable evaluation buffers, one per scan shard.
struct ScanPool {
    bufs: Mutex<Vec<Vec<UserRiskData>>>,
}

impl ScanPool {
    fn new() -> Self {
        Self {
            bufs: Mutex::new(Vec::with_capacity(8)),
        }
    }

    fn get(&self) -> Vec<UserRiskData> {
        self.bufs
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(256))
    }

    fn put(&self, mut buf: Vec<UserRiskData>) {
        buf.clear();
        self.bufs.lock().push(buf);
    }
}

/// The periodic full-scan driver.
pub struct RiskScanner {
    inner: Arc<ScannerInner>,
    shutdown_tx: Sender<()>,
    shutdown_rx: Option<Receiver<()>>,
    handle: Option<JoinHandle<()>>,
}

struct ScannerInner {
    provider: Arc<dyn UserDataProvider>,
    index: Arc<RiskTierIndex>,
    trigger: TaskTrigger,
    config: RiskConfig,
    pool: ScanPool,
    scans_completed: AtomicU64,
}

impl RiskScanner {
    /// Builds the scanner; call [`start`](Self::start) for the periodic
    /// loop, or drive [`scan_once`](Self::scan_once) directly.
    pub fn new(
        provider: Arc<dyn UserDataProvider>,
        index: Arc<RiskTierIndex>,
        trigger: TaskTrigger,
        config: RiskConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = bounded(1);
        Self {
            inner: Arc::new(ScannerInner {
                provider,
                index,
                trigger,
                config,
                pool: ScanPool::new(),
                scans_completed: AtomicU64::new(0),
            }),
            shutdown_tx,
            shutdown_rx: Some(shutdown_rx),
            handle: None,
        }
    }

    /// Spawns the scan loop at the configured cadence.
    pub fn start(&mut self) {
        let Some(shutdown_rx) = self.shutdown_rx.take() else {
            return;
        };
        let inner = Arc::clone(&self.inner);
        let interval = Duration::from_millis(inner.config.scan_interval_ms);
        let handle = std::thread::Builder::new()
            .name("risk-scanner".to_string())
            .spawn(move || {
                debug!("risk scanner started at {interval:?}");
                let ticker = tick(interval);
                loop {
                    crossbeam::select! {
                        recv(shutdown_rx) -> _ => break,
                        recv(ticker) -> _ => inner.scan_once(),
                    }
                }
                debug!("risk scanner stopped");
            })
            .unwrap_or_else(|e| panic!("failed to spawn scanner thread: {e}"));
        self.handle = Some(handle);
        info!(
            "risk scanner started: {} shards every {}ms",
            self.inner.config.num_shards, self.inner.config.scan_interval_ms
        );
    }

    /// Runs exactly one full scan on the calling thread.
    pub fn scan_once(&self) {
        self.inner.scan_once();
    }

    /// Number of completed full scans.
    pub fn scans_completed(&self) -> u64 {
        self.inner.scans_completed.load(Ordering::Relaxed)
    }

    /// Stops the scan loop and joins it. Idempotent.
    pub fn stop(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("risk scanner thread panicked");
        }
    }
}

impl Drop for RiskScanner {
    fn drop(&mut self) {
        self.stop();
    }
}

impl ScannerInner {
    fn scan_once(&self) {
        let user_ids = self.provider.get_all_user_ids();
        let num_shards = self.config.num_shards.max(1);

        let mut partitions: Vec<Vec<UserId>> = vec![Vec::new(); num_shards];
        for user_id in user_ids {
            partitions[(user_id % num_shards as u64) as usize].push(user_id);
        }

        let shard_results: Vec<Vec<UserRiskData>> = std::thread::scope(|scope| {
            let handles: Vec<_> = partitions
                .iter()
                .map(|partition| scope.spawn(move || self.scan_shard(partition)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_default())
                .collect()
        });

        let mut warning = Vec::new();
        let mut danger = Vec::new();
        let mut critical = Vec::new();
        for mut shard_result in shard_results {
            for data in shard_result.drain(..) {
                match data.level {
                    RiskLevel::Warning => warning.push(data),
                    RiskLevel::Danger => danger.push(data),
                    RiskLevel::Critical => critical.push(data),
                    RiskLevel::Safe | RiskLevel::Liquidate => {}
                }
            }
            self.pool.put(shard_result);
        }

        debug!(
            "scan complete: {} warning, {} danger, {} critical",
            warning.len(),
            danger.len(),
            critical.len()
        );
        self.index.batch_update_level(RiskLevel::Warning, warning);
        self.index.batch_update_level(RiskLevel::Danger, danger);
        self.index.batch_update_level(RiskLevel::Critical, critical);
        self.scans_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Evaluates one partition. Liquidate users fire immediately; only
    /// monitored-tier entries come back.
    fn scan_shard(&self, user_ids: &[UserId]) -> Vec<UserRiskData> {
        let now_ms = current_time_millis();
        let mut out = self.pool.get();
        for &user_id in user_ids {
            let Some(input) = self.provider.get_user_risk_input(user_id) else {
                continue;
            };
            let output = compute_risk(&input);
            match classify(output.risk_ratio) {
                RiskLevel::Safe => {}
                RiskLevel::Liquidate => {
                    let symbol = input
                        .positions
                        .first()
                        .map(|position| position.symbol.clone())
                        .unwrap_or_default();
                    let mark = input.marks.get(&symbol).copied().unwrap_or(0);
                    self.trigger.fire(LiquidationTask {
                        user_id,
                        trigger_symbol: symbol,
                        risk_ratio: output.risk_ratio,
                        trigger_price: mark,
                        created_at: now_ms,
                        priority: output.risk_ratio,
                    });
                    self.index.remove_user(user_id);
                }
                _ => out.push(UserRiskData::from_evaluation(&input, &output, now_ms)),
            }
        }
        out
    }
}
