//! Error types for the matching engine and its write-ahead log.

use crate::book::BookError;
use std::fmt;
use std::path::PathBuf;

/// Errors that can occur within the write-ahead log subsystem.
#[derive(Debug)]
#[non_exhaustive]
pub enum WalError {
    /// An I/O error occurred while reading or writing log files.
    Io {
        /// The underlying I/O error message.
        message: String,
        /// The file path involved, if known.
        path: Option<PathBuf>,
    },

    /// A record failed CRC32 integrity verification. Fatal during recovery.
    CorruptRecord {
        /// Byte offset of the record within the file.
        offset: usize,
        /// The CRC32 stored alongside the record.
        expected_crc: u32,
        /// The CRC32 computed from the record bytes.
        actual_crc: u32,
    },

    /// The file ends inside a record. Fatal during recovery; no partial
    /// recovery is attempted.
    TruncatedRecord {
        /// Byte offset where the truncated record starts.
        offset: usize,
    },

    /// A record payload could not be decoded.
    InvalidRecord {
        /// Sequence number of the record, if it could be read.
        sequence: u64,
        /// Description of the decode failure.
        message: String,
    },

    /// A checkpoint file is malformed or has a bad magic/version.
    BadCheckpoint {
        /// Path of the offending checkpoint file.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },
}

impl fmt::Display for WalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalError::Io { message, path } => {
                if let Some(p) = path {
                    write!(f, "wal I/O error at {}: {message}", p.display())
                } else {
                    write!(f, "wal I/O error: {message}")
                }
            }
            WalError::CorruptRecord {
                offset,
                expected_crc,
                actual_crc,
            } => {
                write!(
                    f,
                    "corrupt wal record at offset {offset}: \
                     expected CRC {expected_crc:#010x}, got {actual_crc:#010x}"
                )
            }
            WalError::TruncatedRecord { offset } => {
                write!(f, "truncated wal record at offset {offset}")
            }
            WalError::InvalidRecord { sequence, message } => {
                write!(f, "invalid wal record at sequence {sequence}: {message}")
            }
            WalError::BadCheckpoint { path, message } => {
                write!(f, "bad checkpoint {}: {message}", path.display())
            }
        }
    }
}

impl std::error::Error for WalError {}

impl From<std::io::Error> for WalError {
    #[cold]
    fn from(err: std::io::Error) -> Self {
        WalError::Io {
            message: err.to_string(),
            path: None,
        }
    }
}

/// Errors surfaced by the matching engine driver.
#[derive(Debug)]
#[non_exhaustive]
pub enum EngineError {
    /// The order or cancel queue is saturated; the caller may back off and
    /// retry.
    QueueFull,

    /// The engine has been stopped; terminal.
    Closed,

    /// A write-ahead-log or checkpoint failure.
    Wal(WalError),

    /// A book-level validation failure.
    Book(BookError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::QueueFull => write!(f, "engine queue full"),
            EngineError::Closed => write!(f, "engine is closed"),
            EngineError::Wal(err) => write!(f, "wal error: {err}"),
            EngineError::Book(err) => write!(f, "book error: {err}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<WalError> for EngineError {
    fn from(err: WalError) -> Self {
        EngineError::Wal(err)
    }
}

impl From<BookError> for EngineError {
    fn from(err: BookError) -> Self {
        EngineError::Book(err)
    }
}
