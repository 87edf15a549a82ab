//! Append-only write-ahead log with CRC-framed records.
//!
//! # On-Disk Record Format (little-endian)
//!
//! ```text
//! [4 bytes: length][payload][4 bytes: CRC32]
//! ```
//!
//! - `length`: total payload bytes (everything between itself and the CRC).
//! - CRC32 covers the payload only.
//!
//! Payload layout:
//!
//! ```text
//! [8 bytes: sequence][8 bytes: timestamp_ns][1 byte: kind]
//! [4 bytes: data_len][N bytes: data]
//! ```
//!
//! Writes are write-then-apply: the engine appends a record *before*
//! mutating in-memory state, so a crash between append and apply converges
//! on replay. Reads go through a read-only memory map; a CRC mismatch or a
//! truncated tail record aborts recovery; there is no partial recovery.

use super::error::WalError;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// File name of the log inside a WAL directory.
pub const WAL_FILE_NAME: &str = "wal.log";

/// Fixed payload bytes before the variable-length data.
const PAYLOAD_HEADER_SIZE: usize = 8 + 8 + 1 + 4;

/// Durability policy for appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum SyncMode {
    /// fsync after every record.
    Always,
    /// Flush every record to the OS; fsync on demand (checkpoints, stop).
    #[default]
    Batch,
    /// Never fsync from the hot path; only on close.
    Async,
}

/// A single raw record as read back from disk.
///
/// The matching engine and the account shards share this framing and give
/// `kind`/`data` their own meanings.
#[derive(Debug, Clone, PartialEq)]
pub struct WalRecord {
    /// Strictly monotonic sequence number.
    pub sequence: u64,
    /// Wall-clock timestamp in nanoseconds when the record was appended.
    pub timestamp: i64,
    /// Record type tag, owner-defined.
    pub kind: u8,
    /// Opaque payload bytes.
    pub data: Vec<u8>,
}

/// Single-writer append handle over a `wal.log` file.
#[derive(Debug)]
pub struct Wal {
    path: PathBuf,
    writer: BufWriter<File>,
    sync_mode: SyncMode,
    next_sequence: u64,
}

impl Wal {
    /// Opens (creating if needed) the log inside `dir` for appending.
    ///
    /// `next_sequence` is the sequence the next append will carry; recovery
    /// determines it from the checkpoint cut-off and the replayed tail.
    ///
    /// # Errors
    /// Returns [`WalError::Io`] if the directory or file cannot be opened.
    pub fn open(dir: &Path, sync_mode: SyncMode, next_sequence: u64) -> Result<Self, WalError> {
        std::fs::create_dir_all(dir).map_err(|e| WalError::Io {
            message: e.to_string(),
            path: Some(dir.to_path_buf()),
        })?;
        let path = dir.join(WAL_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| WalError::Io {
                message: e.to_string(),
                path: Some(path.clone()),
            })?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            sync_mode,
            next_sequence,
        })
    }

    /// The sequence number the next append will be assigned.
    #[inline]
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Appends a record, assigning it the next sequence number.
    ///
    /// The record is durably on disk when this returns under
    /// [`SyncMode::Always`]; under `Batch` and `Async` it has at least
    /// reached the OS page cache.
    ///
    /// # Errors
    /// Returns [`WalError::Io`] on write or fsync failure; the sequence is
    /// not consumed in that case.
    pub fn append(&mut self, kind: u8, data: &[u8], timestamp: i64) -> Result<u64, WalError> {
        let sequence = self.next_sequence;
        let frame = encode_record(sequence, timestamp, kind, data);

        self.writer.write_all(&frame).map_err(|e| WalError::Io {
            message: e.to_string(),
            path: Some(self.path.clone()),
        })?;
        self.writer.flush().map_err(|e| WalError::Io {
            message: e.to_string(),
            path: Some(self.path.clone()),
        })?;
        if self.sync_mode == SyncMode::Always {
            self.sync_inner()?;
        }

        self.next_sequence += 1;
        Ok(sequence)
    }

    /// Forces an fsync of everything appended so far.
    pub fn sync(&mut self) -> Result<(), WalError> {
        self.writer.flush().map_err(|e| WalError::Io {
            message: e.to_string(),
            path: Some(self.path.clone()),
        })?;
        self.sync_inner()
    }

    /// Truncates the log to zero length after a successful checkpoint.
    /// The sequence counter keeps advancing; sequences are never reused.
    pub fn truncate(&mut self) -> Result<(), WalError> {
        self.writer.flush().map_err(|e| WalError::Io {
            message: e.to_string(),
            path: Some(self.path.clone()),
        })?;
        self.writer
            .get_ref()
            .set_len(0)
            .map_err(|e| WalError::Io {
                message: e.to_string(),
                path: Some(self.path.clone()),
            })?;
        self.sync_inner()
    }

    fn sync_inner(&self) -> Result<(), WalError> {
        self.writer
            .get_ref()
            .sync_data()
            .map_err(|e| WalError::Io {
                message: e.to_string(),
                path: Some(self.path.clone()),
            })
    }
}

impl Drop for Wal {
    fn drop(&mut self) {
        let _ = self.writer.flush();
        if self.sync_mode != SyncMode::Always {
            let _ = self.writer.get_ref().sync_data();
        }
    }
}

/// Encodes one record into its on-disk frame.
pub fn encode_record(sequence: u64, timestamp: i64, kind: u8, data: &[u8]) -> Vec<u8> {
    let payload_len = PAYLOAD_HEADER_SIZE + data.len();
    let mut frame = Vec::with_capacity(4 + payload_len + 4);
    frame.extend_from_slice(&(payload_len as u32).to_le_bytes());
    frame.extend_from_slice(&sequence.to_le_bytes());
    frame.extend_from_slice(&timestamp.to_le_bytes());
    frame.push(kind);
    frame.extend_from_slice(&(data.len() as u32).to_le_bytes());
    frame.extend_from_slice(data);
    let crc = crc32fast::hash(&frame[4..]);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// Reads every record from `path` through a read-only memory map.
///
/// A missing file yields an empty vector (fresh start). Any CRC mismatch or
/// truncated record is fatal: the caller must refuse to start.
pub fn read_records(path: &Path) -> Result<Vec<WalRecord>, WalError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).map_err(|e| WalError::Io {
        message: e.to_string(),
        path: Some(path.to_path_buf()),
    })?;
    let len = file
        .metadata()
        .map_err(|e| WalError::Io {
            message: e.to_string(),
            path: Some(path.to_path_buf()),
        })?
        .len();
    if len == 0 {
        return Ok(Vec::new());
    }

    // SAFETY: read-only mapping; the single-writer pattern guarantees no
    // concurrent truncation while recovery runs (recovery precedes the
    // writer thread).
    let mmap = unsafe {
        memmap2::Mmap::map(&file).map_err(|e| WalError::Io {
            message: e.to_string(),
            path: Some(path.to_path_buf()),
        })?
    };

    decode_records(&mmap)
}

/// Decodes a concatenation of frames, verifying every CRC.
pub fn decode_records(data: &[u8]) -> Result<Vec<WalRecord>, WalError> {
    let mut records = Vec::new();
    let mut offset = 0usize;

    while offset < data.len() {
        if offset + 4 > data.len() {
            return Err(WalError::TruncatedRecord { offset });
        }
        let payload_len =
            u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
                as usize;
        let payload_start = offset + 4;
        let payload_end = payload_start + payload_len;
        let frame_end = payload_end + 4;
        if payload_len < PAYLOAD_HEADER_SIZE || frame_end > data.len() {
            return Err(WalError::TruncatedRecord { offset });
        }

        let payload = &data[payload_start..payload_end];
        let stored_crc = u32::from_le_bytes([
            data[payload_end],
            data[payload_end + 1],
            data[payload_end + 2],
            data[payload_end + 3],
        ]);
        let computed_crc = crc32fast::hash(payload);
        if stored_crc != computed_crc {
            return Err(WalError::CorruptRecord {
                offset,
                expected_crc: stored_crc,
                actual_crc: computed_crc,
            });
        }

        let sequence = u64::from_le_bytes(
            payload[0..8]
                .try_into()
                .map_err(|_| WalError::TruncatedRecord { offset })?,
        );
        let timestamp = i64::from_le_bytes(
            payload[8..16]
                .try_into()
                .map_err(|_| WalError::TruncatedRecord { offset })?,
        );
        let kind = payload[16];
        let data_len = u32::from_le_bytes(
            payload[17..21]
                .try_into()
                .map_err(|_| WalError::TruncatedRecord { offset })?,
        ) as usize;
        if PAYLOAD_HEADER_SIZE + data_len != payload_len {
            return Err(WalError::InvalidRecord {
                sequence,
                message: format!(
                    "data length {data_len} disagrees with payload length {payload_len}"
                ),
            });
        }

        records.push(WalRecord {
            sequence,
            timestamp,
            kind,
            data: payload[PAYLOAD_HEADER_SIZE..].to_vec(),
        });
        offset = frame_end;
    }

    Ok(records)
}
