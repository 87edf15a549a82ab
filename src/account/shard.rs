//! A single-writer account shard.
//!
//! One thread exclusively owns the shard's ledgers, idempotency records,
//! and WAL; nothing here is behind a lock. The processing order per
//! command: idempotency check, WAL append, execution, idempotency record,
//! snapshot publication, reply. Executed state reaches other threads only
//! through the lock-free [`SnapshotStore`].
//!
//! When persistence is configured the shard keeps `wal.log` (JSON command
//! payloads in the shared CRC frame), `snapshot.bin` (checksummed ledger
//! dump), and `checkpoint.meta` (the decimal sequence the snapshot covers)
//! in its own directory, and recovers from them on spawn.

use super::command::{Command, CommandKind};
use super::error::AccountError;
use super::ledger::UserLedger;
use super::snapshot_store::SnapshotStore;
use crate::engine::wal::{SyncMode, WAL_FILE_NAME, Wal, read_records};
use crate::types::UserId;
use crate::utils::{current_time_millis, current_time_nanos};
use crossbeam::channel::{Receiver, Sender, bounded};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Record kind for account commands in the shard WAL.
pub(crate) const KIND_ACCOUNT_COMMAND: u8 = 1;

const SNAPSHOT_FILE: &str = "snapshot.bin";
const META_FILE: &str = "checkpoint.meta";

/// Commands applied between snapshot persists.
const SNAPSHOT_INTERVAL: u64 = 4096;

/// Messages accepted by a shard thread.
pub(crate) enum ShardMessage {
    /// Apply a command, optionally replying on `result_tx`.
    Command {
        command: Command,
        result_tx: Option<Sender<Result<(), AccountError>>>,
    },
    /// Pin or unpin a ledger against eviction.
    Pin { user_id: UserId, pinned: bool },
    /// Evict idle, flat, unpinned ledgers; replies with the count dropped.
    EvictIdle {
        max_idle_ms: u64,
        result_tx: Sender<usize>,
    },
}

/// Operation counters, shared with the router for aggregation.
#[derive(Debug, Default)]
pub struct ShardStats {
    /// Commands applied successfully.
    pub applied: AtomicU64,
    /// Duplicate command ids refused.
    pub duplicates: AtomicU64,
    /// Commands refused by a failed precondition.
    pub rejected: AtomicU64,
}

/// Handle to one spawned shard thread.
pub(crate) struct AccountShard {
    pub(crate) tx: Sender<ShardMessage>,
    shutdown_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
    pub(crate) stats: Arc<ShardStats>,
}

impl AccountShard {
    /// Recovers shard state from `dir` (when set) and spawns the writer
    /// thread.
    pub(crate) fn spawn(
        shard_id: usize,
        num_shards: usize,
        queue_len: usize,
        dir: Option<PathBuf>,
        store: Arc<SnapshotStore>,
    ) -> Result<Self, AccountError> {
        let mut state = ShardState::recover(shard_id, num_shards, dir, store)?;
        state.publish_all();

        let stats = Arc::clone(&state.stats);
        let (tx, rx) = bounded(queue_len);
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let handle = std::thread::Builder::new()
            .name(format!("account-shard-{shard_id}"))
            .spawn(move || state.run(rx, shutdown_rx))
            .map_err(|e| AccountError::Wal(format!("failed to spawn shard thread: {e}")))?;

        Ok(Self {
            tx,
            shutdown_tx,
            handle: Some(handle),
            stats,
        })
    }

    /// Signals shutdown and joins the writer thread. Idempotent.
    pub(crate) fn stop(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("account shard thread panicked");
        }
    }
}

/// Checksummed on-disk form of a shard's ledgers.
#[derive(Debug, Serialize, Deserialize)]
struct ShardSnapshot {
    version: u32,
    shard_id: usize,
    /// WAL records with sequence ≤ this value are reflected in `users`.
    sequence: u64,
    users: Vec<UserLedger>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ShardSnapshotPackage {
    snapshot: ShardSnapshot,
    /// Hex SHA-256 of the serialized snapshot.
    checksum: String,
}

const SHARD_SNAPSHOT_VERSION: u32 = 1;

/// State owned exclusively by one shard thread.
struct ShardState {
    shard_id: usize,
    num_shards: usize,
    users: HashMap<UserId, UserLedger>,
    store: Arc<SnapshotStore>,
    wal: Option<Wal>,
    dir: Option<PathBuf>,
    commands_since_snapshot: u64,
    stats: Arc<ShardStats>,
}

impl ShardState {
    fn recover(
        shard_id: usize,
        num_shards: usize,
        dir: Option<PathBuf>,
        store: Arc<SnapshotStore>,
    ) -> Result<Self, AccountError> {
        let mut state = Self {
            shard_id,
            num_shards,
            users: HashMap::new(),
            store,
            wal: None,
            dir: dir.clone(),
            commands_since_snapshot: 0,
            stats: Arc::new(ShardStats::default()),
        };
        let Some(dir) = dir else {
            return Ok(state);
        };

        let mut covered = 0u64;
        let snapshot_path = dir.join(SNAPSHOT_FILE);
        if snapshot_path.exists() {
            let data = std::fs::read(&snapshot_path)
                .map_err(|e| AccountError::Wal(format!("read {SNAPSHOT_FILE}: {e}")))?;
            let package: ShardSnapshotPackage = serde_json::from_slice(&data)
                .map_err(|e| AccountError::Wal(format!("parse {SNAPSHOT_FILE}: {e}")))?;
            let computed = snapshot_checksum(&package.snapshot)?;
            if computed != package.checksum {
                return Err(AccountError::Wal(format!(
                    "{SNAPSHOT_FILE} checksum mismatch: stored {}, computed {computed}",
                    package.checksum
                )));
            }
            if package.snapshot.version != SHARD_SNAPSHOT_VERSION {
                return Err(AccountError::Wal(format!(
                    "unsupported {SNAPSHOT_FILE} version {}",
                    package.snapshot.version
                )));
            }
            covered = package.snapshot.sequence;
            for ledger in package.snapshot.users {
                state.users.insert(ledger.user_id, ledger);
            }
            info!(
                "shard {shard_id}: restored {} ledgers through sequence {covered}",
                state.users.len()
            );
        }

        // checkpoint.meta is the authority on the covered sequence; it is
        // written after the snapshot, so it can only lag behind, never lead.
        let meta_path = dir.join(META_FILE);
        if meta_path.exists() {
            let text = std::fs::read_to_string(&meta_path)
                .map_err(|e| AccountError::Wal(format!("read {META_FILE}: {e}")))?;
            covered = text
                .trim()
                .parse::<u64>()
                .map_err(|e| AccountError::Wal(format!("parse {META_FILE}: {e}")))?
                .max(covered);
        }

        let records = read_records(&dir.join(WAL_FILE_NAME))
            .map_err(|e| AccountError::Wal(e.to_string()))?;
        let mut next_sequence = covered + 1;
        let now_ms = current_time_millis();
        let mut replayed = 0usize;
        for record in records {
            next_sequence = next_sequence.max(record.sequence + 1);
            if record.sequence <= covered {
                continue;
            }
            let command: Command = serde_json::from_slice(&record.data)
                .map_err(|e| AccountError::Wal(format!("decode command record: {e}")))?;
            // Replay outcomes mirror the original run, including rejections.
            let _ = state.apply(&command, now_ms);
            replayed += 1;
        }
        if replayed > 0 {
            info!("shard {shard_id}: replayed {replayed} wal commands");
        }

        state.wal = Some(
            Wal::open(&dir, SyncMode::Batch, next_sequence)
                .map_err(|e| AccountError::Wal(e.to_string()))?,
        );
        Ok(state)
    }

    fn run(&mut self, rx: Receiver<ShardMessage>, shutdown_rx: Receiver<()>) {
        debug!("account shard {} started", self.shard_id);
        loop {
            crossbeam::select! {
                recv(shutdown_rx) -> _ => break,
                recv(rx) -> msg => match msg {
                    Ok(message) => self.handle(message),
                    Err(_) => break,
                }
            }
        }
        // Drain accepted work, then persist.
        while let Ok(message) = rx.try_recv() {
            self.handle(message);
        }
        if let Err(e) = self.persist_snapshot() {
            error!("shard {}: final snapshot persist failed: {e}", self.shard_id);
        }
        if let Some(wal) = &mut self.wal
            && let Err(e) = wal.sync()
        {
            error!("shard {}: final wal sync failed: {e}", self.shard_id);
        }
        debug!("account shard {} stopped", self.shard_id);
    }

    fn handle(&mut self, message: ShardMessage) {
        match message {
            ShardMessage::Command { command, result_tx } => {
                let result = self.process(command);
                if let Some(result_tx) = result_tx {
                    let _ = result_tx.try_send(result);
                }
            }
            ShardMessage::Pin { user_id, pinned } => {
                self.users
                    .entry(user_id)
                    .or_insert_with(|| UserLedger::new(user_id))
                    .pinned = pinned;
            }
            ShardMessage::EvictIdle {
                max_idle_ms,
                result_tx,
            } => {
                let evicted = self.evict_idle(max_idle_ms);
                let _ = result_tx.try_send(evicted);
            }
        }
    }

    fn process(&mut self, command: Command) -> Result<(), AccountError> {
        // Idempotency gate: duplicates answer without side effects and
        // without a WAL record.
        if self
            .users
            .get(&command.user_id)
            .is_some_and(|ledger| ledger.applied_cmds.contains(&command.cmd_id))
        {
            self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
            return Err(AccountError::DuplicateCommand(command.cmd_id));
        }

        // Write-then-apply.
        if let Some(wal) = &mut self.wal {
            let data = serde_json::to_vec(&command)
                .map_err(|e| AccountError::Wal(format!("encode command: {e}")))?;
            wal.append(KIND_ACCOUNT_COMMAND, &data, current_time_nanos())
                .map_err(|e| AccountError::Wal(e.to_string()))?;
        }

        let result = self.apply(&command, current_time_millis());
        match &result {
            Ok(touched) => {
                self.stats.applied.fetch_add(1, Ordering::Relaxed);
                for user_id in touched {
                    self.publish(*user_id);
                }
            }
            Err(_) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.commands_since_snapshot += 1;
        if self.commands_since_snapshot >= SNAPSHOT_INTERVAL
            && let Err(e) = self.persist_snapshot()
        {
            error!("shard {}: snapshot persist failed: {e}", self.shard_id);
        }

        result.map(|_| ())
    }

    /// Validates and executes one command against the ledgers, returning
    /// the users whose snapshots must be republished.
    fn apply(&mut self, command: &Command, now_ms: u64) -> Result<Vec<UserId>, AccountError> {
        if self
            .users
            .get(&command.user_id)
            .is_some_and(|ledger| ledger.applied_cmds.contains(&command.cmd_id))
        {
            return Err(AccountError::DuplicateCommand(command.cmd_id.clone()));
        }

        let mut touched = vec![command.user_id];
        match command.kind {
            CommandKind::Reserve => {
                self.ledger_mut(command.user_id)
                    .reserve(&command.asset, command.amount)?;
            }
            CommandKind::Release => {
                self.ledger_mut(command.user_id)
                    .release(&command.asset, command.amount)?;
            }
            CommandKind::AddBalance => {
                self.ledger_mut(command.user_id)
                    .credit_available(&command.asset, command.amount)?;
            }
            CommandKind::DeductBalance => {
                self.ledger_mut(command.user_id)
                    .debit_available(&command.asset, command.amount)?;
            }
            CommandKind::Transfer => {
                let receiver_shard = (command.to_user_id % self.num_shards as u64) as usize;
                if receiver_shard != self.shard_id {
                    return Err(AccountError::CrossShardReceiver {
                        receiver: command.to_user_id,
                        receiver_shard,
                        shard: self.shard_id,
                    });
                }
                if command.to_amount <= 0 {
                    return Err(AccountError::InvalidAmount(command.to_amount));
                }

                let payer = self.ledger_mut(command.user_id);
                payer.debit_locked(&command.asset, command.amount)?;
                if command.fee > 0
                    && let Err(e) = payer.debit_available(&command.fee_asset, command.fee)
                {
                    // Policy choice: a fee shortfall does not fail the
                    // settlement leg.
                    warn!(
                        "shard {}: fee shortfall on {}: {e}",
                        self.shard_id, command.cmd_id
                    );
                }

                if command.to_user_id == command.user_id {
                    self.ledger_mut(command.user_id)
                        .credit_available(&command.to_asset, command.to_amount)?;
                } else {
                    let receiver = self.ledger_mut(command.to_user_id);
                    receiver.credit_available(&command.to_asset, command.to_amount)?;
                    receiver.touch(now_ms);
                    touched.push(command.to_user_id);
                }
            }
        }

        let payer = self.ledger_mut(command.user_id);
        payer.applied_cmds.insert(command.cmd_id.clone());
        payer.touch(now_ms);
        Ok(touched)
    }

    fn ledger_mut(&mut self, user_id: UserId) -> &mut UserLedger {
        self.users
            .entry(user_id)
            .or_insert_with(|| UserLedger::new(user_id))
    }

    fn publish(&self, user_id: UserId) {
        if let Some(ledger) = self.users.get(&user_id) {
            self.store.publish(user_id, ledger.balances.clone());
        }
    }

    fn publish_all(&self) {
        for user_id in self.users.keys() {
            self.publish(*user_id);
        }
    }

    fn evict_idle(&mut self, max_idle_ms: u64) -> usize {
        let now_ms = current_time_millis();
        let evictable: Vec<UserId> = self
            .users
            .values()
            .filter(|ledger| ledger.evictable(now_ms, max_idle_ms))
            .map(|ledger| ledger.user_id)
            .collect();
        for user_id in &evictable {
            self.users.remove(user_id);
            self.store.remove(*user_id);
        }
        if !evictable.is_empty() {
            debug!("shard {}: evicted {} idle ledgers", self.shard_id, evictable.len());
        }
        evictable.len()
    }

    /// Writes `snapshot.bin` and `checkpoint.meta`, then truncates the WAL.
    fn persist_snapshot(&mut self) -> Result<(), AccountError> {
        let (Some(dir), Some(wal)) = (self.dir.clone(), self.wal.as_mut()) else {
            return Ok(());
        };
        let sequence = wal.next_sequence().saturating_sub(1);
        let snapshot = ShardSnapshot {
            version: SHARD_SNAPSHOT_VERSION,
            shard_id: self.shard_id,
            sequence,
            users: self.users.values().cloned().collect(),
        };
        let checksum = snapshot_checksum(&snapshot)?;
        let package = ShardSnapshotPackage { snapshot, checksum };
        let bytes = serde_json::to_vec(&package)
            .map_err(|e| AccountError::Wal(format!("encode snapshot: {e}")))?;

        let final_path = dir.join(SNAPSHOT_FILE);
        let tmp_path = dir.join(format!("{SNAPSHOT_FILE}.tmp"));
        std::fs::write(&tmp_path, &bytes)
            .map_err(|e| AccountError::Wal(format!("write snapshot: {e}")))?;
        std::fs::rename(&tmp_path, &final_path)
            .map_err(|e| AccountError::Wal(format!("publish snapshot: {e}")))?;
        std::fs::write(dir.join(META_FILE), format!("{sequence}"))
            .map_err(|e| AccountError::Wal(format!("write meta: {e}")))?;

        wal.truncate()
            .map_err(|e| AccountError::Wal(e.to_string()))?;
        self.commands_since_snapshot = 0;
        debug!(
            "shard {}: persisted snapshot through sequence {sequence}",
            self.shard_id
        );
        Ok(())
    }
}

fn snapshot_checksum(snapshot: &ShardSnapshot) -> Result<String, AccountError> {
    let payload = serde_json::to_vec(snapshot)
        .map_err(|e| AccountError::Wal(format!("encode snapshot: {e}")))?;
    let mut hasher = Sha256::new();
    hasher.update(payload);
    Ok(format!("{:x}", hasher.finalize()))
}
