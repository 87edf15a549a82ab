//! Boot-time recovery: checkpoint restore plus WAL-tail replay.
//!
//! The checkpoint restores resting orders structurally, byte-for-byte as
//! they stood. The WAL tail (entries past the checkpoint cut-off) re-runs
//! through the matcher so crossing orders converge on the same book state
//! the process had before it died. Replay is silent: recovery happens before
//! the event dispatcher exists, so replayed trades are never re-emitted
//! downstream.
//!
//! Any CRC mismatch, truncated record, or malformed checkpoint aborts
//! recovery; the engine refuses to start and an operator must intervene.

use super::checkpoint::load_latest_checkpoint;
use super::codec::WalEntry;
use super::error::EngineError;
use super::wal::{WAL_FILE_NAME, read_records};
use crate::book::OrderBook;
use crate::types::IdSequence;
use std::path::Path;
use tracing::{info, warn};

/// The state rebuilt by [`recover`].
pub(crate) struct RecoveredState {
    /// The book with every surviving resting order.
    pub book: OrderBook,
    /// Sequence the WAL writer should continue from.
    pub next_sequence: u64,
    /// Highest order id observed; the id generator must move past it.
    pub max_order_id: u64,
    /// Number of WAL entries replayed after the checkpoint.
    pub replayed: usize,
}

/// Rebuilds a book for `symbol` from the latest checkpoint and WAL tail in
/// `wal_dir`.
pub(crate) fn recover(
    wal_dir: &Path,
    symbol: &str,
    depth_levels: usize,
) -> Result<RecoveredState, EngineError> {
    let mut book = OrderBook::with_depth(symbol, depth_levels);
    let mut max_order_id = 0u64;
    let mut cutoff = 0u64;

    if let Some(checkpoint) = load_latest_checkpoint(wal_dir)? {
        cutoff = checkpoint.sequence;
        for order in checkpoint.orders {
            max_order_id = max_order_id.max(order.id.0);
            book.add(order)?;
        }
        info!(
            "restored checkpoint at sequence {} with {} resting orders",
            cutoff,
            book.order_count()
        );
    }

    let records = read_records(&wal_dir.join(WAL_FILE_NAME))?;
    let mut next_sequence = cutoff + 1;
    let mut replayed = 0usize;

    // Trades regenerated during replay are discarded along with these ids;
    // only the structural book state matters.
    let replay_trade_ids = IdSequence::new(1);

    for record in records {
        next_sequence = next_sequence.max(record.sequence + 1);
        let entry = WalEntry::decode(&record)?;
        if let WalEntry::PlaceOrder(order) = &entry {
            // Ids from pre-cutoff entries still count: an order that filled
            // and died before the checkpoint must never be reissued.
            max_order_id = max_order_id.max(order.id.0);
        }
        if record.sequence <= cutoff {
            continue;
        }
        match entry {
            WalEntry::PlaceOrder(order) => {
                let timestamp = record.timestamp;
                match book.execute(order, &replay_trade_ids, timestamp) {
                    Ok(_) => replayed += 1,
                    Err(e) => {
                        // A rejection that replays as a rejection is normal;
                        // it left no state behind in the original run either.
                        warn!("replay of sequence {} was rejected: {e}", record.sequence);
                    }
                }
            }
            WalEntry::CancelOrder(order_id) => {
                if book.cancel(order_id).is_err() {
                    // The order may have fully filled before the cancel was
                    // logged; the original run saw the same miss.
                    warn!("replay cancel of {} found nothing", order_id);
                }
                replayed += 1;
            }
            WalEntry::Checkpoint { .. } => {}
        }
    }

    book.update_snapshot();
    if replayed > 0 {
        info!("replayed {replayed} wal entries past sequence {cutoff}");
    }

    Ok(RecoveredState {
        book,
        next_sequence,
        max_order_id,
        replayed,
    })
}
