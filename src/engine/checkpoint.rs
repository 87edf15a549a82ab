//! Dense order-book checkpoints.
//!
//! A checkpoint captures every resting order plus the WAL sequence cut-off
//! it reflects, shortening recovery to "restore checkpoint, replay tail".
//!
//! # On-Disk Layout (little-endian)
//!
//! ```text
//! [4: magic "CPT1"][1: version][8: sequence][8: order_count][orders…]
//! ```
//!
//! Each order uses the canonical binary form from [`super::codec`]. The file
//! is written as `checkpoint_<seq>.dat.tmp` and published by rename, so a
//! crash mid-write never leaves a readable half-checkpoint behind.

use super::codec::{decode_order, encode_order};
use super::error::WalError;
use crate::book::Order;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Checkpoint file magic, the bytes `CPT1` as a big-endian u32.
pub const CHECKPOINT_MAGIC: u32 = 0x4350_5431;

/// Current checkpoint format version.
pub const CHECKPOINT_VERSION: u8 = 1;

const HEADER_SIZE: usize = 4 + 1 + 8 + 8;

/// A loaded checkpoint: the sequence cut-off and the resting orders in
/// canonical book order (price priority, FIFO within a level).
#[derive(Debug)]
pub struct Checkpoint {
    /// WAL entries with sequence ≤ this value are reflected in `orders`.
    pub sequence: u64,
    /// Every order that was resting when the checkpoint was taken.
    pub orders: Vec<Order>,
}

/// Writes a checkpoint for `sequence` into `dir`, publishing by rename.
///
/// # Errors
/// Returns [`WalError::Io`] if the temp file cannot be written, synced, or
/// renamed.
pub fn write_checkpoint<'a>(
    dir: &Path,
    sequence: u64,
    orders: impl ExactSizeIterator<Item = &'a Order>,
) -> Result<PathBuf, WalError> {
    let final_path = checkpoint_path(dir, sequence);
    let tmp_path = final_path.with_extension("dat.tmp");

    let mut buf = Vec::with_capacity(HEADER_SIZE + orders.len() * 64);
    buf.extend_from_slice(&CHECKPOINT_MAGIC.to_le_bytes());
    buf.push(CHECKPOINT_VERSION);
    buf.extend_from_slice(&sequence.to_le_bytes());
    buf.extend_from_slice(&(orders.len() as u64).to_le_bytes());
    for order in orders {
        encode_order(order, &mut buf);
    }

    let mut file = fs::File::create(&tmp_path).map_err(|e| WalError::Io {
        message: e.to_string(),
        path: Some(tmp_path.clone()),
    })?;
    file.write_all(&buf).map_err(|e| WalError::Io {
        message: e.to_string(),
        path: Some(tmp_path.clone()),
    })?;
    file.sync_data().map_err(|e| WalError::Io {
        message: e.to_string(),
        path: Some(tmp_path.clone()),
    })?;
    drop(file);

    fs::rename(&tmp_path, &final_path).map_err(|e| WalError::Io {
        message: e.to_string(),
        path: Some(final_path.clone()),
    })?;
    debug!("wrote checkpoint {} at sequence {}", final_path.display(), sequence);
    Ok(final_path)
}

/// Loads the checkpoint with the highest sequence in `dir`, if any.
///
/// # Errors
/// Returns [`WalError::BadCheckpoint`] if the newest checkpoint is
/// malformed; recovery must not fall back to an older one silently.
pub fn load_latest_checkpoint(dir: &Path) -> Result<Option<Checkpoint>, WalError> {
    let Some(sequence) = list_checkpoints(dir)?.into_iter().max() else {
        return Ok(None);
    };
    let path = checkpoint_path(dir, sequence);
    let data = fs::read(&path).map_err(|e| WalError::Io {
        message: e.to_string(),
        path: Some(path.clone()),
    })?;
    parse_checkpoint(&data, &path).map(Some)
}

/// Deletes checkpoint files older than `keep_sequence`. Best effort; a
/// failed unlink is logged, not fatal.
pub fn remove_older_checkpoints(dir: &Path, keep_sequence: u64) -> Result<usize, WalError> {
    let mut removed = 0usize;
    for sequence in list_checkpoints(dir)? {
        if sequence < keep_sequence {
            let path = checkpoint_path(dir, sequence);
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("failed to remove old checkpoint {}: {e}", path.display()),
            }
        }
    }
    Ok(removed)
}

fn parse_checkpoint(data: &[u8], path: &Path) -> Result<Checkpoint, WalError> {
    let bad = |message: String| WalError::BadCheckpoint {
        path: path.to_path_buf(),
        message,
    };

    if data.len() < HEADER_SIZE {
        return Err(bad("file shorter than header".to_string()));
    }
    let magic = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    if magic != CHECKPOINT_MAGIC {
        return Err(bad(format!("bad magic {magic:#010x}")));
    }
    let version = data[4];
    if version != CHECKPOINT_VERSION {
        return Err(bad(format!("unsupported version {version}")));
    }
    let sequence = u64::from_le_bytes(
        data[5..13]
            .try_into()
            .map_err(|_| bad("short header".to_string()))?,
    );
    let order_count = u64::from_le_bytes(
        data[13..21]
            .try_into()
            .map_err(|_| bad("short header".to_string()))?,
    ) as usize;

    let mut orders = Vec::with_capacity(order_count);
    let mut pos = HEADER_SIZE;
    for _ in 0..order_count {
        let order = decode_order(data, &mut pos).map_err(bad)?;
        orders.push(order);
    }
    if pos != data.len() {
        return Err(bad(format!("{} trailing bytes", data.len() - pos)));
    }

    Ok(Checkpoint { sequence, orders })
}

fn checkpoint_path(dir: &Path, sequence: u64) -> PathBuf {
    dir.join(format!("checkpoint_{sequence}.dat"))
}

fn list_checkpoints(dir: &Path) -> Result<Vec<u64>, WalError> {
    let mut sequences = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(sequences),
        Err(e) => {
            return Err(WalError::Io {
                message: e.to_string(),
                path: Some(dir.to_path_buf()),
            });
        }
    };
    for entry in entries {
        let entry = entry.map_err(|e| WalError::Io {
            message: e.to_string(),
            path: Some(dir.to_path_buf()),
        })?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(rest) = name.strip_prefix("checkpoint_")
            && let Some(seq_str) = rest.strip_suffix(".dat")
            && let Ok(sequence) = seq_str.parse::<u64>()
        {
            sequences.push(sequence);
        }
    }
    Ok(sequences)
}
